//! Vespa Deployer - Entry Point
//!
//! Deploys application package directories to a local container or to the
//! managed cloud dev environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing::{error, info};

use vespa_deployer::app::options::{CloudOptions, DockerOptions};
use vespa_deployer::authn::key::KeySource;
use vespa_deployer::deploy::cloud::CloudDeployment;
use vespa_deployer::deploy::docker::DockerCli;
use vespa_deployer::deploy::local::DockerDeployment;
use vespa_deployer::filesys::file::File;
use vespa_deployer::http::client::{ReqwestTransport, DEFAULT_TIMEOUT};
use vespa_deployer::logs::{init_logging, LogLevel, LogOptions};
use vespa_deployer::output::Output;
use vespa_deployer::storage::layout::default_settings_file;
use vespa_deployer::storage::settings::Settings;
use vespa_deployer::utils::version_info;

/// Environment variable holding the PEM contents of the cloud API key
const API_KEY_ENV: &str = "VESPA_CLOUD_API_KEY";

#[derive(Parser)]
#[command(name = "vespa-deployer", version, about = "Deploy Vespa application packages")]
struct Cli {
    /// Settings file, defaults to ~/.vespa-deployer/settings.json
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy an application package directory to a local container
    Local {
        /// Application name, also used as container name
        #[arg(long)]
        name: String,

        /// Application package directory
        #[arg(long)]
        dir: PathBuf,

        /// Deploy to this existing container instead
        #[arg(long)]
        container: Option<String>,

        /// Publish the debug port
        #[arg(long)]
        debug: bool,

        /// Container image
        #[arg(long)]
        image: Option<String>,

        /// Host port for the serving port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Deploy an application package directory to the cloud dev environment
    Cloud {
        /// Application name; the endpoint cluster is `<name>_container`
        #[arg(long)]
        name: String,

        /// Application package directory
        #[arg(long)]
        dir: PathBuf,

        #[arg(long, default_value = "default")]
        instance: String,

        /// Where to write the data plane key and certificate
        #[arg(long)]
        disk_folder: Option<PathBuf>,

        #[command(flatten)]
        target: CloudTarget,
    },

    /// Delete an instance from the cloud dev environment
    Delete {
        #[arg(long, default_value = "default")]
        instance: String,

        #[command(flatten)]
        target: CloudTarget,
    },

    /// Control the services inside an existing container
    Services {
        /// Container name or id
        #[arg(long)]
        container: String,

        #[command(subcommand)]
        action: ServicesAction,
    },

    /// Print version information
    Version,
}

#[derive(clap::Args)]
struct CloudTarget {
    #[arg(long)]
    tenant: Option<String>,

    #[arg(long)]
    application: Option<String>,

    /// PEM encoded API key; the key may also be passed in VESPA_CLOUD_API_KEY
    #[arg(long)]
    key_path: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Copy)]
enum ServicesAction {
    Start,
    Stop,
    Restart,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        print_version();
        return;
    }

    let settings = match load_settings(cli.settings.clone()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e:#}");
            std::process::exit(2);
        }
    };

    let log_options = LogOptions {
        log_level: cli.log_level.unwrap_or(settings.log_level),
        json_format: cli.log_json || settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Err(e) = run(cli.command, settings).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn print_version() {
    match serde_json::to_string_pretty(&version_info()) {
        Ok(version) => println!("{}", version),
        Err(e) => eprintln!("Failed to serialize version info: {e}"),
    }
}

async fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let file = match path {
        Some(path) => File::new(path),
        None => {
            let file = default_settings_file();
            if !file.exists().await {
                return Ok(Settings::default());
            }
            file
        }
    };
    file.read_json::<Settings>()
        .await
        .with_context(|| format!("reading {}", file.path().display()))
}

async fn run(command: Command, settings: Settings) -> anyhow::Result<()> {
    let output = Output::stdout();
    let runtime_timeout = Duration::from_secs(settings.docker.runtime_timeout_secs);
    let http = Arc::new(ReqwestTransport::new(DEFAULT_TIMEOUT)?);

    match command {
        Command::Local {
            name,
            dir,
            container,
            debug,
            image,
            port,
        } => {
            let mut options = DockerOptions::try_from(&settings.docker)?;
            if let Some(image) = image {
                options.image = image;
            }
            if let Some(port) = port {
                options.port = port;
            }
            let runtime = Arc::new(DockerCli::new(runtime_timeout));

            let mut deployment = match container {
                Some(container) => {
                    DockerDeployment::from_container_name_or_id(&container, runtime, http, options, output).await?
                }
                None => DockerDeployment::new(runtime, http, options, output),
            };
            info!("Deploying {} from {}", name, dir.display());
            let handle = deployment.deploy_from_disk(&name, &dir, debug).await?;
            info!("Application available at {}", handle.endpoint());
        }

        Command::Cloud {
            name,
            dir,
            instance,
            disk_folder,
            target,
        } => {
            let deployment = cloud_deployment(target, &settings, http, output).await?;
            let handle = deployment
                .deploy_from_disk(&instance, &name, &dir, disk_folder.as_deref())
                .await?;
            info!("Application available at {}", handle.endpoint());
        }

        Command::Delete { instance, target } => {
            let deployment = cloud_deployment(target, &settings, http, output).await?;
            deployment.delete(&instance).await?;
        }

        Command::Services { container, action } => {
            let runtime = Arc::new(DockerCli::new(runtime_timeout));
            let options = DockerOptions::try_from(&settings.docker)?;
            let mut deployment =
                DockerDeployment::from_container_name_or_id(&container, runtime, http, options, output).await?;
            match action {
                ServicesAction::Start => deployment.start_services().await?,
                ServicesAction::Stop => deployment.stop_services().await?,
                ServicesAction::Restart => deployment.restart_services().await?,
            }
        }

        Command::Version => print_version(),
    }

    Ok(())
}

async fn cloud_deployment(
    target: CloudTarget,
    settings: &Settings,
    http: Arc<ReqwestTransport>,
    output: Output,
) -> anyhow::Result<CloudDeployment> {
    let tenant = target
        .tenant
        .or_else(|| settings.cloud.tenant.clone())
        .ok_or_else(|| anyhow!("no tenant given; use --tenant or cloud.tenant in the settings file"))?;
    let application = target
        .application
        .or_else(|| settings.cloud.application.clone())
        .ok_or_else(|| anyhow!("no application given; use --application or cloud.application in the settings file"))?;

    let key = match target
        .key_path
        .or_else(|| settings.cloud.key_path.clone().map(PathBuf::from))
    {
        Some(path) => KeySource::Path(path),
        None => {
            let content = std::env::var(API_KEY_ENV)
                .map_err(|_| anyhow!("no API key given; use --key-path or set {}", API_KEY_ENV))?;
            KeySource::Content(SecretString::from(content))
        }
    };

    let options = CloudOptions::try_from(&settings.cloud)?;
    let deployment = CloudDeployment::new(tenant, application, key, options, http, output).await?;
    Ok(deployment)
}
