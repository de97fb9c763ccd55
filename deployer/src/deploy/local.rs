//! Deployments to a local container
//!
//! [`DockerDeployment`] keeps track of one container running the engine
//! image. It creates or restarts the container, waits for the config server
//! inside it, posts the application archive to the config server and waits
//! for the application to answer.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::app::handle::ServiceHandle;
use crate::app::options::DockerOptions;
use crate::deploy::docker::{
    ContainerInfo, ContainerRuntime, ContainerSpec, PortMapping, CONFIG_SERVER_PORT, SERVING_PORT,
};
use crate::deploy::fsm::{ContainerEvent, ContainerFsm, ContainerState};
use crate::errors::DeployError;
use crate::http::client::{HttpRequest, HttpTransport};
use crate::http::deployments::PREPARE_AND_ACTIVATE_PATH;
use crate::output::Output;
use crate::package::archive::ArchiveBuilder;
use crate::package::disk::zip_directory;
use crate::package::ApplicationPackage;
use crate::utils::image_repository;

/// Executed inside the container to probe the config server
pub const CONFIG_SERVER_PROBE: &str = "curl -s --head http://localhost:19071/ApplicationStatus";

/// Executed inside the container when the config server never came up
pub const DUMP_LOG_COMMAND: &str = "cat /opt/vespa/logs/vespa/vespa.log";

const STOP_SERVICES: &str = "/opt/vespa/bin/vespa-stop-services";
const STOP_CONFIG_SERVER: &str = "/opt/vespa/bin/vespa-stop-configserver";
const START_CONFIG_SERVER: &str = "/opt/vespa/bin/vespa-start-configserver";
const START_SERVICES: &str = "/opt/vespa/bin/vespa-start-services";

/// Whether the output of [`CONFIG_SERVER_PROBE`] reports a healthy config server.
///
/// Only an exact `HTTP/1.1 200 OK` status line counts.
pub fn is_config_server_ready(probe_output: &str) -> bool {
    probe_output.split("\r\n").next() == Some("HTTP/1.1 200 OK")
}

/// The fields two local deployments are compared on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentIdentity {
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub url: String,
    pub port: u16,
    pub memory_bytes: u64,

    /// Image without its tag
    pub image_repository: String,
}

/// Orchestrates the local container and deploys application packages to it
pub struct DockerDeployment {
    runtime: Arc<dyn ContainerRuntime>,
    http: Arc<dyn HttpTransport>,
    options: DockerOptions,
    container: Option<ContainerInfo>,
    fsm: ContainerFsm,
    output: Output,
}

impl DockerDeployment {
    /// Create an orchestrator that tracks no container yet
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        http: Arc<dyn HttpTransport>,
        options: DockerOptions,
        output: Output,
    ) -> Self {
        Self {
            runtime,
            http,
            options,
            container: None,
            fsm: ContainerFsm::new(),
            output,
        }
    }

    /// Attach to an existing container.
    ///
    /// Ports, memory and image are taken from the runtime's inspection data and
    /// override the corresponding values in `options`.
    pub async fn from_container_name_or_id(
        name_or_id: &str,
        runtime: Arc<dyn ContainerRuntime>,
        http: Arc<dyn HttpTransport>,
        mut options: DockerOptions,
        output: Output,
    ) -> Result<Self, DeployError> {
        let info = runtime
            .inspect(name_or_id)
            .await?
            .ok_or_else(|| DeployError::ContainerNotFound(name_or_id.to_string()))?;

        if let Some(port) = info.host_port(SERVING_PORT) {
            options.port = port;
        }
        if let Some(port) = info.host_port(CONFIG_SERVER_PORT) {
            options.cfgsrv_port = port;
        }
        if info.memory_bytes > 0 {
            options.memory_bytes = info.memory_bytes;
        }
        options.image = info.image.clone();

        info!("Attached to container {} ({})", info.name, info.id);

        let mut deployment = Self::new(runtime, http, options, output);
        deployment.container = Some(info);
        deployment.transition(ContainerEvent::Attach)?;
        Ok(deployment)
    }

    pub fn options(&self) -> &DockerOptions {
        &self.options
    }

    /// The tracked container, if any
    pub fn container(&self) -> Option<&ContainerInfo> {
        self.container.as_ref()
    }

    pub fn state(&self) -> ContainerState {
        self.fsm.state()
    }

    pub fn identity(&self) -> DeploymentIdentity {
        DeploymentIdentity {
            container_id: self.container.as_ref().map(|c| c.id.clone()),
            container_name: self.container.as_ref().map(|c| c.name.clone()),
            url: self.options.url.clone(),
            port: self.options.port,
            memory_bytes: self.options.memory_bytes,
            image_repository: image_repository(&self.options.image).to_string(),
        }
    }

    fn transition(&mut self, event: ContainerEvent) -> Result<ContainerState, DeployError> {
        self.fsm.process(event).map_err(DeployError::LifecycleError)
    }

    fn fail(&mut self, reason: String) {
        // Fail is accepted from every state
        let _ = self.fsm.process(ContainerEvent::Fail(reason));
    }

    fn container_id(&self) -> Result<String, DeployError> {
        self.container
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or(DeployError::NoContainer)
    }

    /// Make sure a container named `application_name` is running.
    ///
    /// A tracked container is restarted. Otherwise a container with that name
    /// is looked up and restarted, or created when there is none. Calling this
    /// repeatedly never creates a second container.
    pub async fn ensure_running(
        &mut self,
        application_name: &str,
        memory_bytes: u64,
        debug: bool,
    ) -> Result<&ContainerInfo, DeployError> {
        let existing = match self.container.take() {
            Some(container) => Some(container),
            None => self.runtime.inspect(application_name).await?,
        };

        let result = match existing {
            Some(container) => self.restart_container(container).await,
            None => self.create_container(application_name, memory_bytes, debug).await,
        };

        match result {
            Ok(container) => {
                self.transition(ContainerEvent::Started)?;
                Ok(self.container.insert(container))
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn restart_container(&mut self, container: ContainerInfo) -> Result<ContainerInfo, DeployError> {
        self.transition(ContainerEvent::Restart)?;
        info!("Restarting container {} ({})", container.name, container.id);
        self.runtime.restart(&container.id).await?;
        Ok(container)
    }

    async fn create_container(
        &mut self,
        application_name: &str,
        memory_bytes: u64,
        debug: bool,
    ) -> Result<ContainerInfo, DeployError> {
        self.transition(ContainerEvent::Create)?;

        let mut ports = vec![
            PortMapping {
                container: SERVING_PORT,
                host: self.options.port,
            },
            PortMapping {
                container: CONFIG_SERVER_PORT,
                host: self.options.cfgsrv_port,
            },
        ];
        if debug {
            ports.push(PortMapping {
                container: self.options.debug_port,
                host: self.options.debug_port,
            });
        }

        let spec = ContainerSpec {
            name: application_name.to_string(),
            hostname: application_name.to_string(),
            image: self.options.image.clone(),
            memory_bytes,
            ports,
            privileged: true,
        };
        self.runtime.create(&spec).await
    }

    /// Probe the config server once from inside the container
    pub async fn check_config_server(&self) -> bool {
        let Some(container) = &self.container else {
            return false;
        };
        match self.runtime.exec(&container.id, CONFIG_SERVER_PROBE).await {
            Ok(output) => is_config_server_ready(&output),
            Err(e) => {
                debug!("Config server probe failed: {}", e);
                false
            }
        }
    }

    /// Write the engine log of the container to the debug log
    pub async fn dump_runtime_log(&self) {
        let Some(container) = &self.container else {
            return;
        };
        match self.runtime.exec(&container.id, DUMP_LOG_COMMAND).await {
            Ok(log) => {
                debug!("Dumping vespa.log:");
                debug!("{}", log);
            }
            Err(e) => debug!("Unable to read vespa.log: {}", e),
        }
    }

    /// Probe the config server every probe interval until it is ready or
    /// `max_wait` is used up. Time spent inside a probe counts against the budget.
    pub async fn await_config_server_ready(&mut self, max_wait: Duration) -> Result<(), DeployError> {
        let interval = self.options.probe_interval;
        let start = Instant::now();
        loop {
            if self.check_config_server().await {
                self.transition(ContainerEvent::Ready)?;
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= max_wait {
                self.dump_runtime_log().await;
                let err = DeployError::ReadinessTimeout {
                    waited: max_wait.as_secs(),
                };
                error!("{}", err);
                self.fail(err.to_string());
                return Err(err);
            }
            self.output.line(format!(
                "Waiting for configuration server, {}/{} seconds...",
                waited.as_secs(),
                max_wait.as_secs()
            ));
            tokio::time::sleep(interval).await;
        }
    }

    fn service_handle(&self) -> ServiceHandle {
        ServiceHandle::new(
            self.options.url.clone(),
            Some(self.options.port),
            self.http.clone(),
            self.output.clone(),
        )
        .with_probe_interval(self.options.probe_interval)
    }

    /// Deploy a generated application package
    pub async fn deploy(&mut self, package: &ApplicationPackage, debug: bool) -> Result<ServiceHandle, DeployError> {
        let data = ArchiveBuilder::new(package).build()?;
        self.deploy_data(&package.name, data, debug).await
    }

    /// Deploy an application package directory as is
    pub async fn deploy_from_disk(
        &mut self,
        application_name: &str,
        application_root: &Path,
        debug: bool,
    ) -> Result<ServiceHandle, DeployError> {
        let data = zip_directory(application_root)?;
        self.deploy_data(application_name, data, debug).await
    }

    async fn deploy_data(
        &mut self,
        application_name: &str,
        data: Vec<u8>,
        debug: bool,
    ) -> Result<ServiceHandle, DeployError> {
        self.ensure_running(application_name, self.options.memory_bytes, debug).await?;
        self.await_config_server_ready(self.options.cfgsrv_start_timeout).await?;

        let url = format!(
            "{}:{}{}",
            self.options.url, self.options.cfgsrv_port, PREPARE_AND_ACTIVATE_PATH
        );
        info!("Deploying {} ({} bytes)", application_name, data.len());
        let request = HttpRequest::new(Method::POST, url.clone())
            .header("Content-Type", "application/zip")
            .body(data);
        let response = self.http.send(request).await?;
        debug!("Deploy status code: {}", response.status);

        if response.status != 200 {
            return Err(DeployError::Submission {
                status: response.status,
                method: Method::POST.to_string(),
                url,
                message: response.error_message(),
            });
        }

        let handle = self.service_handle();
        handle.wait_for_application_up(self.options.app_init_timeout).await?;
        self.output.line("Finished deployment.");
        Ok(handle)
    }

    /// Stop the services and the config server inside the container
    pub async fn stop_services(&mut self) -> Result<(), DeployError> {
        let id = self.container_id()?;

        let stop_services = self.runtime.exec(&id, STOP_SERVICES).await?;
        self.output.lines(stop_services.trim_end());
        let stop_config_server = self.runtime.exec(&id, STOP_CONFIG_SERVER).await?;
        self.output.lines(stop_config_server.trim_end());

        self.transition(ContainerEvent::Stop)?;
        Ok(())
    }

    /// Start the config server and the services inside the container, then
    /// wait for both within the restart budget
    pub async fn start_services(&mut self) -> Result<(), DeployError> {
        let id = self.container_id()?;

        let start_config_server = self.runtime.exec(&id, START_CONFIG_SERVER).await?;
        self.transition(ContainerEvent::Start)?;
        self.await_config_server_ready(self.options.restart_wait).await?;
        self.output.lines(start_config_server.trim_end());

        let start_services = self.runtime.exec(&id, START_SERVICES).await?;
        self.service_handle()
            .wait_for_application_up(self.options.restart_wait)
            .await?;
        self.output.lines(start_services.trim_end());
        Ok(())
    }

    pub async fn restart_services(&mut self) -> Result<(), DeployError> {
        self.stop_services().await?;
        self.start_services().await
    }
}

impl PartialEq for DockerDeployment {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Display for DockerDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.identity();
        write!(
            f,
            "DockerDeployment(url={}, port={}, container_name={}, container_id={}, memory={}, image={})",
            identity.url,
            identity.port,
            identity.container_name.as_deref().unwrap_or("-"),
            identity.container_id.as_deref().unwrap_or("-"),
            identity.memory_bytes,
            identity.image_repository
        )
    }
}

impl fmt::Debug for DockerDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerDeployment")
            .field("identity", &self.identity())
            .field("state", &self.fsm.state())
            .finish()
    }
}
