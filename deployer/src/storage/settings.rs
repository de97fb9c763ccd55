//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Local container configuration
    #[serde(default)]
    pub docker: DockerSettings,

    /// Managed cloud configuration
    #[serde(default)]
    pub cloud: CloudSettings,
}

/// Local container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Container image, tag optional
    #[serde(default = "default_image")]
    pub image: String,

    /// Host port mapped to the serving port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host port mapped to the config server
    #[serde(default = "default_cfgsrv_port")]
    pub cfgsrv_port: u16,

    /// Port mapped when debugging is enabled
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    /// Container memory limit in bytes
    #[serde(default = "default_memory")]
    pub memory_bytes: u64,

    /// Seconds between readiness probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Seconds to wait for the config server on first boot
    #[serde(default = "default_cfgsrv_start_timeout")]
    pub cfgsrv_start_timeout_secs: u64,

    /// Seconds to wait for the application after activation
    #[serde(default = "default_app_init_timeout")]
    pub app_init_timeout_secs: u64,

    /// Seconds to wait for services after an explicit start/restart
    #[serde(default = "default_restart_wait")]
    pub restart_wait_secs: u64,

    /// Timeout in seconds for a single container runtime command
    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout_secs: u64,
}

fn default_image() -> String {
    "vespaengine/vespa".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cfgsrv_port() -> u16 {
    19071
}

fn default_debug_port() -> u16 {
    5005
}

fn default_memory() -> u64 {
    4 * 1024 * 1024 * 1024
}

fn default_probe_interval() -> u64 {
    5
}

fn default_cfgsrv_start_timeout() -> u64 {
    300
}

fn default_app_init_timeout() -> u64 {
    300
}

fn default_restart_wait() -> u64 {
    1_000_000
}

fn default_runtime_timeout() -> u64 {
    600
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image: default_image(),
            port: default_port(),
            cfgsrv_port: default_cfgsrv_port(),
            debug_port: default_debug_port(),
            memory_bytes: default_memory(),
            probe_interval_secs: default_probe_interval(),
            cfgsrv_start_timeout_secs: default_cfgsrv_start_timeout(),
            app_init_timeout_secs: default_app_init_timeout(),
            restart_wait_secs: default_restart_wait(),
            runtime_timeout_secs: default_runtime_timeout(),
        }
    }
}

/// Managed cloud settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Control plane host
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Control plane port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Tenant name
    #[serde(default)]
    pub tenant: Option<String>,

    /// Application name
    #[serde(default)]
    pub application: Option<String>,

    /// Path to the PEM encoded API key
    #[serde(default)]
    pub key_path: Option<String>,

    /// Seconds between job status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to wait for the deployed application to come up
    #[serde(default = "default_app_init_timeout")]
    pub app_init_timeout_secs: u64,

    /// Seconds between application status probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// File name for the data plane key and certificate
    #[serde(default = "default_private_cert_file_name")]
    pub private_cert_file_name: String,
}

fn default_api_host() -> String {
    "api.vespa-external.aws.oath.cloud".to_string()
}

fn default_api_port() -> u16 {
    4443
}

fn default_poll_interval() -> u64 {
    1
}

fn default_private_cert_file_name() -> String {
    "private_cert.txt".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_port: default_api_port(),
            tenant: None,
            application: None,
            key_path: None,
            poll_interval_secs: default_poll_interval(),
            app_init_timeout_secs: default_app_init_timeout(),
            probe_interval_secs: default_probe_interval(),
            private_cert_file_name: default_private_cert_file_name(),
        }
    }
}
