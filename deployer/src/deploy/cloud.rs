//! Deployments to the managed cloud
//!
//! Every control plane request is signed with the tenant's API key. A fresh
//! client certificate is generated per [`CloudDeployment`]; it is embedded in
//! the archive as `security/clients.pem` and, together with its key, written
//! to disk so the deployed endpoint can be reached afterwards.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use http::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::app::handle::ServiceHandle;
use crate::app::options::CloudOptions;
use crate::authn::certificate::ClientCertificate;
use crate::authn::key::{ApiKey, KeySource};
use crate::authn::signer::RequestSigner;
use crate::errors::{CloudJobFailure, DeployError};
use crate::http::client::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, DEFAULT_TIMEOUT};
use crate::http::deployments::{
    deploy_path, dev_deployment_path, instance_path, run_path, DEV_ZONE_PATH,
};
use crate::models::deployment::{
    dev_job, DeploymentJob, DeploymentResponse, JobStatus, JobUpdate, LogEntry, MessageResponse, SubmitResponse,
    ZoneResponse,
};
use crate::output::Output;
use crate::package::archive::{ArchiveBuilder, CLIENT_CERTIFICATE_ENTRY};
use crate::package::disk::zip_directory_with;
use crate::package::{container_cluster, ApplicationPackage};
use crate::storage::layout::DeploymentLayout;
use crate::utils::indent_continuation;

/// Log step whose entries are only shown when they are errors
pub const COPY_VESPA_LOGS_STEP: &str = "copyVespaLogs";

/// Width of the `LEVEL   [HH:MM:SS]  ` prefix of a printed log entry
pub const LOG_PREFIX_WIDTH: usize = 23;

/// Render a remote log entry as one (possibly multi-line) progress line,
/// timestamped in UTC
pub fn format_log_entry(entry: &LogEntry) -> String {
    let time = entry
        .timestamp()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    format!(
        "{:<7} [{}]  {}",
        entry.entry_type.to_uppercase(),
        time,
        indent_continuation(&entry.message, LOG_PREFIX_WIDTH)
    )
}

/// Client for one tenant and application in the cloud dev environment
pub struct CloudDeployment {
    tenant: String,
    application: String,
    signer: RequestSigner,
    certificate: ClientCertificate,
    options: CloudOptions,
    http: Arc<dyn HttpTransport>,
    endpoint_transport: Option<Arc<dyn HttpTransport>>,
    output: Output,
}

impl CloudDeployment {
    /// Load the API key and generate a client certificate
    pub async fn new(
        tenant: impl Into<String>,
        application: impl Into<String>,
        key: KeySource,
        options: CloudOptions,
        http: Arc<dyn HttpTransport>,
        output: Output,
    ) -> Result<Self, DeployError> {
        let key = ApiKey::load(key).await?;
        let certificate = ClientCertificate::generate()?;
        Self::with_key(tenant, application, key, certificate, options, http, output)
    }

    /// Build a client from an already loaded key and certificate
    pub fn with_key(
        tenant: impl Into<String>,
        application: impl Into<String>,
        key: ApiKey,
        certificate: ClientCertificate,
        options: CloudOptions,
        http: Arc<dyn HttpTransport>,
        output: Output,
    ) -> Result<Self, DeployError> {
        let tenant = tenant.into();
        let application = application.into();
        let signer = RequestSigner::new(key, &tenant, &application)?;
        debug!("Using {} API key {}", signer.key().curve(), signer.key_id());

        Ok(Self {
            tenant,
            application,
            signer,
            certificate,
            options,
            http,
            endpoint_transport: None,
            output,
        })
    }

    /// Use this transport to reach deployed endpoints instead of a client
    /// authenticating with the generated certificate
    pub fn with_endpoint_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.endpoint_transport = Some(transport);
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn certificate(&self) -> &ClientCertificate {
        &self.certificate
    }

    /// Send a signed request to the control plane
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<HttpResponse, DeployError> {
        let url = format!("{}{}", self.options.api_url, path);
        let headers = self.signer.sign(&method, &url, &body, Utc::now())?;

        let mut request = HttpRequest::new(method.clone(), url.clone()).headers(headers);
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }
        let response = self.http.send(request.body(body)).await?;

        if !response.is_success() {
            return Err(DeployError::Submission {
                status: response.status,
                method: method.to_string(),
                url,
                message: response.error_message(),
            });
        }
        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, DeployError> {
        self.request(method, path, Vec::new(), None).await?.json()
    }

    /// Default region of the dev environment
    pub async fn dev_region(&self) -> Result<String, DeployError> {
        let zone: ZoneResponse = self.request_json(Method::GET, DEV_ZONE_PATH).await?;
        Ok(zone.name)
    }

    /// URL of the container endpoint of a deployment
    pub async fn resolve_endpoint(
        &self,
        instance: &str,
        region: &str,
        application_name: &str,
    ) -> Result<String, DeployError> {
        let path = dev_deployment_path(&self.tenant, &self.application, instance, region);
        let deployment: DeploymentResponse = self.request_json(Method::GET, &path).await?;

        let cluster = container_cluster(application_name);
        deployment
            .endpoints
            .into_iter()
            .find(|endpoint| endpoint.cluster == cluster)
            .map(|endpoint| endpoint.url)
            .ok_or(DeployError::EndpointNotFound(cluster))
    }

    /// Persist the data plane credentials and submit an archive.
    ///
    /// Returns the run number assigned to the job.
    pub async fn submit(
        &self,
        instance: &str,
        job: &str,
        archive: Vec<u8>,
        layout: &DeploymentLayout,
    ) -> Result<u64, DeployError> {
        layout.setup().await?;
        let cert_file = layout.private_cert_file(&self.options.private_cert_file_name);
        cert_file
            .write_secret(&self.certificate.key_and_certificate_pem()?)
            .await?;
        debug!("Wrote client key and certificate to {}", cert_file.path().display());

        let path = deploy_path(&self.tenant, &self.application, instance, job);
        info!("Submitting {} bytes to {}", archive.len(), job);
        let response: SubmitResponse = self
            .request(Method::POST, &path, archive, Some("application/zip"))
            .await?
            .json()?;

        self.output.line(&response.message);
        Ok(response.run)
    }

    /// Fetch new log entries and the status of a run
    pub async fn poll_once(&self, job: &mut DeploymentJob) -> Result<JobStatus, DeployError> {
        let path = run_path(&job.tenant, &job.application, &job.instance, &job.job, job.run, job.last_id);
        let update: JobUpdate = self.request_json(Method::GET, &path).await?;

        for (step, entries) in update.log_entries()? {
            for entry in entries {
                if step == COPY_VESPA_LOGS_STEP && !entry.is_error() {
                    continue;
                }
                self.output.line(format_log_entry(&entry));
            }
        }
        if let Some(last_id) = update.last_id {
            job.last_id = job.last_id.max(last_id);
        }

        if update.active {
            job.status = JobStatus::Active;
            return Ok(job.status);
        }

        match update.status.as_deref() {
            Some("success") => {
                job.status = JobStatus::Success;
                Ok(job.status)
            }
            status => {
                job.status = JobStatus::Failed;
                Err(CloudJobFailure::from_status(status.unwrap_or("")).into())
            }
        }
    }

    /// Poll until the run leaves the active state.
    ///
    /// Only a successful run returns `Ok`.
    pub async fn follow_to_completion(&self, job: &mut DeploymentJob) -> Result<(), DeployError> {
        loop {
            self.poll_once(job).await?;
            if job.is_terminal() {
                break;
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }

        match job.status {
            JobStatus::Success => Ok(()),
            status => Err(DeployError::LifecycleError(format!(
                "Run {} of {} ended as {:?}",
                job.run, job.job, status
            ))),
        }
    }

    /// Deploy a generated application package to the dev environment
    pub async fn deploy(
        &self,
        instance: &str,
        package: &ApplicationPackage,
        disk_folder: Option<&Path>,
    ) -> Result<ServiceHandle, DeployError> {
        let archive = ArchiveBuilder::new(package)
            .with_client_certificate(self.certificate.certificate_pem()?)
            .build()?;
        let layout = DeploymentLayout::resolve(disk_folder, &package.name);
        self.deploy_data(instance, &package.name, archive, &layout).await
    }

    /// Deploy an application package directory, adding the client certificate
    pub async fn deploy_from_disk(
        &self,
        instance: &str,
        application_name: &str,
        application_root: &Path,
        disk_folder: Option<&Path>,
    ) -> Result<ServiceHandle, DeployError> {
        let certificate = self.certificate.certificate_pem()?;
        let archive = zip_directory_with(
            application_root,
            &[(CLIENT_CERTIFICATE_ENTRY, certificate.as_bytes())],
        )?;
        let layout = DeploymentLayout::resolve(disk_folder, application_name);
        self.deploy_data(instance, application_name, archive, &layout).await
    }

    async fn deploy_data(
        &self,
        instance: &str,
        application_name: &str,
        archive: Vec<u8>,
        layout: &DeploymentLayout,
    ) -> Result<ServiceHandle, DeployError> {
        let region = self.dev_region().await?;
        let job_name = dev_job(&region);

        let run = self.submit(instance, &job_name, archive, layout).await?;
        let mut job = DeploymentJob::new(&self.tenant, &self.application, instance, &region, run);
        self.follow_to_completion(&mut job).await?;

        let endpoint = self.resolve_endpoint(instance, &region, application_name).await?;
        info!("Endpoint of {}: {}", application_name, endpoint);

        let cert_file = layout.private_cert_file(&self.options.private_cert_file_name);
        let transport = match &self.endpoint_transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::with_identity(
                self.certificate.key_and_certificate_pem()?.as_bytes(),
                DEFAULT_TIMEOUT,
            )?),
        };
        let handle = ServiceHandle::new(endpoint, None, transport, self.output.clone())
            .with_cert_file(cert_file.path())
            .with_probe_interval(self.options.probe_interval);
        handle.wait_for_application_up(self.options.app_init_timeout).await?;
        self.output.line("Finished deployment.");
        Ok(handle)
    }

    /// Delete the dev deployment of an instance, then the instance itself
    pub async fn delete(&self, instance: &str) -> Result<(), DeployError> {
        let region = self.dev_region().await?;

        let path = dev_deployment_path(&self.tenant, &self.application, instance, &region);
        let response: MessageResponse = self.request_json(Method::DELETE, &path).await?;
        self.output.line(&response.message);

        let path = instance_path(&self.tenant, &self.application, instance);
        let response: MessageResponse = self.request_json(Method::DELETE, &path).await?;
        self.output.line(&response.message);
        Ok(())
    }
}

impl std::fmt::Debug for CloudDeployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudDeployment")
            .field("tenant", &self.tenant)
            .field("application", &self.application)
            .field("api_url", &self.options.api_url)
            .finish()
    }
}
