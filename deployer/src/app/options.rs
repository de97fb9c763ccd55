//! Deployment options

use std::time::Duration;

use crate::errors::DeployError;
use crate::storage::settings::{CloudSettings, DockerSettings};

/// Reject a zero polling delay, which would turn a wait into a busy loop
fn nonzero_secs(name: &str, secs: u64) -> Result<Duration, DeployError> {
    if secs == 0 {
        return Err(DeployError::ConfigError(format!("{} must be at least 1 second", name)));
    }
    Ok(Duration::from_secs(secs))
}

/// Options for deployments to a local container
#[derive(Debug, Clone)]
pub struct DockerOptions {
    /// Container image, tag optional
    pub image: String,

    /// Base URL of the host running the container
    pub url: String,

    /// Host port mapped to the serving port (8080)
    pub port: u16,

    /// Host port mapped to the config server (19071)
    pub cfgsrv_port: u16,

    /// Port mapped one-to-one when debugging is enabled
    pub debug_port: u16,

    /// Container memory limit in bytes
    pub memory_bytes: u64,

    /// Delay between readiness probes
    pub probe_interval: Duration,

    /// Budget for the config server on first boot
    pub cfgsrv_start_timeout: Duration,

    /// Budget for the application after activation
    pub app_init_timeout: Duration,

    /// Budget for services after an explicit start or restart.
    /// Defaults to practically forever; operators can lower it.
    pub restart_wait: Duration,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            image: "vespaengine/vespa".to_string(),
            url: "http://localhost".to_string(),
            port: 8080,
            cfgsrv_port: 19071,
            debug_port: 5005,
            memory_bytes: 4 * 1024 * 1024 * 1024,
            probe_interval: Duration::from_secs(5),
            cfgsrv_start_timeout: Duration::from_secs(300),
            app_init_timeout: Duration::from_secs(300),
            restart_wait: Duration::from_secs(1_000_000),
        }
    }
}

impl TryFrom<&DockerSettings> for DockerOptions {
    type Error = DeployError;

    fn try_from(settings: &DockerSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            image: settings.image.clone(),
            url: "http://localhost".to_string(),
            port: settings.port,
            cfgsrv_port: settings.cfgsrv_port,
            debug_port: settings.debug_port,
            memory_bytes: settings.memory_bytes,
            probe_interval: nonzero_secs("docker.probe_interval_secs", settings.probe_interval_secs)?,
            cfgsrv_start_timeout: Duration::from_secs(settings.cfgsrv_start_timeout_secs),
            app_init_timeout: Duration::from_secs(settings.app_init_timeout_secs),
            restart_wait: Duration::from_secs(settings.restart_wait_secs),
        })
    }
}

/// Options for deployments to the managed cloud
#[derive(Debug, Clone)]
pub struct CloudOptions {
    /// Control plane origin, e.g. `https://api.vespa-external.aws.oath.cloud:4443`
    pub api_url: String,

    /// Delay between job status polls
    pub poll_interval: Duration,

    /// Budget for the deployed application to come up
    pub app_init_timeout: Duration,

    /// Delay between application status probes
    pub probe_interval: Duration,

    /// File name for the data plane key and certificate
    pub private_cert_file_name: String,
}

impl Default for CloudOptions {
    fn default() -> Self {
        Self {
            api_url: "https://api.vespa-external.aws.oath.cloud:4443".to_string(),
            poll_interval: Duration::from_secs(1),
            app_init_timeout: Duration::from_secs(300),
            probe_interval: Duration::from_secs(5),
            private_cert_file_name: "private_cert.txt".to_string(),
        }
    }
}

impl TryFrom<&CloudSettings> for CloudOptions {
    type Error = DeployError;

    fn try_from(settings: &CloudSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            api_url: format!("https://{}:{}", settings.api_host, settings.api_port),
            poll_interval: nonzero_secs("cloud.poll_interval_secs", settings.poll_interval_secs)?,
            app_init_timeout: Duration::from_secs(settings.app_init_timeout_secs),
            probe_interval: nonzero_secs("cloud.probe_interval_secs", settings.probe_interval_secs)?,
            private_cert_file_name: settings.private_cert_file_name.clone(),
        })
    }
}
