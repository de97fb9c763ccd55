//! Control plane payloads and deployment job state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reply to a deployment submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub message: String,

    /// Run number assigned by the control plane
    pub run: u64,
}

/// Reply carrying only a human readable message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Default zone of an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneResponse {
    /// Region name, e.g. `aws-us-east-1c`
    pub name: String,
}

/// One entry in a job's append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Epoch milliseconds
    pub at: i64,

    /// Severity, e.g. `info`, `warning`, `error`
    #[serde(rename = "type")]
    pub entry_type: String,

    pub message: String,
}

impl LogEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.at)
    }

    pub fn is_error(&self) -> bool {
        self.entry_type == "error"
    }
}

/// Incremental job status after a given log offset
#[derive(Debug, Clone, Deserialize)]
pub struct JobUpdate {
    /// Whether the run is still in progress
    #[serde(default)]
    pub active: bool,

    /// Run status, meaningful once the run is inactive
    #[serde(default)]
    pub status: Option<String>,

    /// New log entries per step, in step order
    #[serde(default)]
    pub log: serde_json::Map<String, serde_json::Value>,

    /// Id of the last log entry included in this update
    #[serde(rename = "lastId", default)]
    pub last_id: Option<i64>,
}

impl JobUpdate {
    /// Log entries grouped by step, preserving the order of the reply
    pub fn log_entries(&self) -> Result<Vec<(String, Vec<LogEntry>)>, serde_json::Error> {
        self.log
            .iter()
            .map(|(step, entries)| {
                let entries: Vec<LogEntry> = serde_json::from_value(entries.clone())?;
                Ok((step.clone(), entries))
            })
            .collect()
    }
}

/// A registered endpoint of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub cluster: String,
    pub url: String,
}

/// Deployment details, of which only the endpoints are used
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentResponse {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Status of a deployment job, as far as the client can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, not yet polled
    Pending,

    /// Still running remotely
    Active,

    /// Finished successfully
    Success,

    /// Finished with a classified failure
    Failed,
}

/// A submitted deployment job and the client's cursor into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentJob {
    pub tenant: String,
    pub application: String,
    pub instance: String,
    pub region: String,

    /// Job name, e.g. `dev-aws-us-east-1c`
    pub job: String,

    pub run: u64,

    /// Last consumed log entry id
    pub last_id: i64,

    pub status: JobStatus,
}

impl DeploymentJob {
    pub fn new(
        tenant: impl Into<String>,
        application: impl Into<String>,
        instance: impl Into<String>,
        region: impl Into<String>,
        run: u64,
    ) -> Self {
        let region = region.into();
        Self {
            tenant: tenant.into(),
            application: application.into(),
            instance: instance.into(),
            job: dev_job(&region),
            region,
            run,
            last_id: -1,
            status: JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Success | JobStatus::Failed)
    }
}

/// Job name for a manual deployment to a dev region
pub fn dev_job(region: &str) -> String {
    format!("dev-{}", region)
}
