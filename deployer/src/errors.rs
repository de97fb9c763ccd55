//! Error types for the deployer

use thiserror::Error;

/// Main error type for local and cloud deployments
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Packaging error: {0}")]
    PackagingError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("The container does not exist: {0}")]
    ContainerNotFound(String),

    #[error("No container found")]
    NoContainer,

    #[error("Config server did not start, waited for {waited} seconds.")]
    ReadinessTimeout { waited: u64 },

    #[error("Application did not start, waited for {waited} seconds.")]
    ApplicationTimeout { waited: u64 },

    #[error("Status code {status} doing {method} at {url}:\n{message}")]
    Submission {
        status: u16,
        method: String,
        url: String,
        message: String,
    },

    #[error(transparent)]
    CloudJob(#[from] CloudJobFailure),

    #[error("No endpoints found for container '{0}'")]
    EndpointNotFound(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DeployError {
    /// Remote message carried by a failed submission, if any
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            DeployError::Submission { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Terminal failure of a cloud deployment job, classified by remote status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudJobFailure {
    #[error("Unexpected error during deployment; see log for details")]
    Error,

    #[error("Deployment was aborted, probably by a newer deployment")]
    Aborted,

    #[error("No capacity left in zone; please contact the Vespa team")]
    OutOfCapacity,

    #[error("Deployment failed; see log for details")]
    DeploymentFailed,

    #[error("Installation failed; see Vespa log for details")]
    InstallationFailed,

    #[error("Deployment not completed")]
    NotCompleted,

    #[error("Endpoint certificate not ready in time; please contact Vespa team")]
    EndpointCertificateTimeout,

    #[error("Unexpected status; tests are not run for manual deployments")]
    TestFailure,

    #[error("Unexpected status: {0}")]
    Unrecognized(String),
}

impl CloudJobFailure {
    /// Classify a non-success terminal status reported by the control plane
    pub fn from_status(status: &str) -> Self {
        match status {
            "error" => CloudJobFailure::Error,
            "aborted" => CloudJobFailure::Aborted,
            "outOfCapacity" => CloudJobFailure::OutOfCapacity,
            "deploymentFailed" => CloudJobFailure::DeploymentFailed,
            "installationFailed" => CloudJobFailure::InstallationFailed,
            "running" => CloudJobFailure::NotCompleted,
            "endpointCertificateTimeout" => CloudJobFailure::EndpointCertificateTimeout,
            "testFailure" => CloudJobFailure::TestFailure,
            other => CloudJobFailure::Unrecognized(other.to_string()),
        }
    }
}
