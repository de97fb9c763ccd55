//! Handle to a deployed, running application

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::DeployError;
use crate::http::client::{HttpRequest, HttpTransport};
use crate::http::deployments::APPLICATION_STATUS_PATH;
use crate::output::Output;

/// Where a deployed application can be reached, and how to authenticate
pub struct ServiceHandle {
    url: String,
    port: Option<u16>,
    cert_file: Option<PathBuf>,
    http: Arc<dyn HttpTransport>,
    probe_interval: Duration,
    output: Output,
}

impl ServiceHandle {
    pub fn new(url: impl Into<String>, port: Option<u16>, http: Arc<dyn HttpTransport>, output: Output) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            port,
            cert_file: None,
            http,
            probe_interval: Duration::from_secs(5),
            output,
        }
    }

    /// Key and certificate file used for client authentication
    pub fn with_cert_file(mut self, cert_file: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(cert_file.into());
        self
    }

    pub fn with_probe_interval(mut self, probe_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self
    }

    /// Base URL including the port, if one was given
    pub fn endpoint(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.url, port),
            None => self.url.clone(),
        }
    }

    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    /// Whether the application answers its status endpoint
    pub async fn is_up(&self) -> bool {
        let request = HttpRequest::new(Method::GET, format!("{}{}", self.endpoint(), APPLICATION_STATUS_PATH));
        match self.http.send(request).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                debug!("Application status request failed: {}", e);
                false
            }
        }
    }

    /// Poll the status endpoint until it answers or `max_wait` is used up
    pub async fn wait_for_application_up(&self, max_wait: Duration) -> Result<(), DeployError> {
        let start = Instant::now();
        loop {
            if self.is_up().await {
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= max_wait {
                return Err(DeployError::ApplicationTimeout {
                    waited: max_wait.as_secs(),
                });
            }
            self.output.line(format!(
                "Waiting for application status, {}/{} seconds...",
                waited.as_secs(),
                max_wait.as_secs()
            ));
            tokio::time::sleep(self.probe_interval).await;
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("cert_file", &self.cert_file)
            .finish()
    }
}
