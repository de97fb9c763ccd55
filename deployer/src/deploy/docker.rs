//! Container runtime access
//!
//! The orchestrator only needs five operations from the runtime, collected in
//! [`ContainerRuntime`]. [`DockerCli`] implements them by shelling out to the
//! `docker` binary.

use std::collections::HashMap;
use std::process::Output as ProcessOutput;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::DeployError;

/// Serving port inside the container
pub const SERVING_PORT: u16 = 8080;

/// Config server port inside the container
pub const CONFIG_SERVER_PORT: u16 = 19071;

/// A published container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortMapping {
    pub container: u16,
    pub host: u16,
}

/// What to create when no container exists yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub hostname: String,
    pub image: String,
    pub memory_bytes: u64,
    pub ports: Vec<PortMapping>,
    pub privileged: bool,
}

/// What the runtime reports about an existing container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub memory_bytes: u64,
    pub ports: Vec<PortMapping>,
}

impl ContainerInfo {
    /// Host port published for a container port
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|mapping| mapping.container == container_port)
            .map(|mapping| mapping.host)
    }
}

/// Container lifecycle operations used by the local deployer
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up a container by name or id
    async fn inspect(&self, name_or_id: &str) -> Result<Option<ContainerInfo>, DeployError>;

    /// Create and start a detached container
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerInfo, DeployError>;

    async fn restart(&self, id: &str) -> Result<(), DeployError>;

    async fn stop(&self, id: &str) -> Result<(), DeployError>;

    /// Run a shell command inside the container and return its combined output.
    /// A non-zero exit status of the command itself is not an error.
    async fn exec(&self, id: &str, command: &str) -> Result<String, DeployError>;
}

/// [`ContainerRuntime`] backed by the `docker` command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "docker".to_string(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<ProcessOutput, DeployError> {
        debug!("Running {} {}", self.binary, args.join(" "));
        let output = tokio::time::timeout(self.timeout, Command::new(&self.binary).args(args).output())
            .await
            .map_err(|_| {
                DeployError::RuntimeError(format!(
                    "{} {} timed out after {} seconds",
                    self.binary,
                    args.first().unwrap_or(&""),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| DeployError::RuntimeError(format!("Failed to run {}: {}", self.binary, e)))?;
        Ok(output)
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String, DeployError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(DeployError::RuntimeError(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn inspect(&self, name_or_id: &str) -> Result<Option<ContainerInfo>, DeployError> {
        let output = self.run(&["inspect", "--type", "container", name_or_id]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such") {
                return Ok(None);
            }
            return Err(DeployError::RuntimeError(format!(
                "{} inspect failed: {}",
                self.binary,
                stderr.trim()
            )));
        }
        parse_inspect(&output.stdout)
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerInfo, DeployError> {
        info!("Starting container {} from {}", spec.name, spec.image);

        let memory = spec.memory_bytes.to_string();
        let publish: Vec<String> = spec
            .ports
            .iter()
            .map(|mapping| format!("{}:{}", mapping.host, mapping.container))
            .collect();

        let mut args = vec![
            "run",
            "--detach",
            "--name",
            spec.name.as_str(),
            "--hostname",
            spec.hostname.as_str(),
            "--memory",
            memory.as_str(),
        ];
        if spec.privileged {
            args.push("--privileged");
        }
        for mapping in &publish {
            args.push("--publish");
            args.push(mapping);
        }
        args.push(&spec.image);

        let id = self.run_checked(&args).await?;
        self.inspect(&id).await?.ok_or_else(|| {
            DeployError::RuntimeError(format!("Container {} disappeared after start", spec.name))
        })
    }

    async fn restart(&self, id: &str) -> Result<(), DeployError> {
        self.run_checked(&["restart", id]).await.map(|_| ())
    }

    async fn stop(&self, id: &str) -> Result<(), DeployError> {
        self.run_checked(&["stop", id]).await.map(|_| ())
    }

    async fn exec(&self, id: &str, command: &str) -> Result<String, DeployError> {
        let output = self.run(&["exec", id, "bash", "-c", command]).await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectOutput {
    id: String,
    name: String,
    config: InspectConfig,
    host_config: InspectHostConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostConfig {
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    port_bindings: Option<HashMap<String, Option<Vec<InspectPortBinding>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectPortBinding {
    #[serde(default)]
    host_port: String,
}

/// Parse `docker inspect` output for a single container
pub fn parse_inspect(stdout: &[u8]) -> Result<Option<ContainerInfo>, DeployError> {
    let containers: Vec<InspectOutput> = serde_json::from_slice(stdout)?;
    let Some(container) = containers.into_iter().next() else {
        return Ok(None);
    };

    let mut ports: Vec<PortMapping> = container
        .host_config
        .port_bindings
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, bindings)| {
            let container_port = key.split('/').next()?.parse().ok()?;
            let host_port = bindings?.first()?.host_port.parse().ok()?;
            Some(PortMapping {
                container: container_port,
                host: host_port,
            })
        })
        .collect();
    ports.sort();

    Ok(Some(ContainerInfo {
        id: container.id,
        name: container.name.trim_start_matches('/').to_string(),
        image: container.config.image,
        memory_bytes: container.host_config.memory,
        ports,
    }))
}
