//! On-disk layout for deployment state

use std::path::{Path, PathBuf};

use crate::filesys::file::File;

/// Folder holding the files a deployment leaves behind, such as the data
/// plane key and certificate used to talk to a cloud endpoint afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentLayout {
    /// Base directory for this application's deployment state
    pub disk_folder: PathBuf,
}

impl DeploymentLayout {
    /// Create a layout rooted at an explicit folder
    pub fn new(disk_folder: impl Into<PathBuf>) -> Self {
        Self {
            disk_folder: disk_folder.into(),
        }
    }

    /// Default layout: a folder named after the application in the working directory
    pub fn for_application(application_name: &str) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(cwd.join(application_name))
    }

    /// Use `disk_folder` when given, otherwise the application default
    pub fn resolve(disk_folder: Option<&Path>, application_name: &str) -> Self {
        match disk_folder {
            Some(folder) => Self::new(folder),
            None => Self::for_application(application_name),
        }
    }

    /// Combined private key and certificate PEM file
    pub fn private_cert_file(&self, file_name: &str) -> File {
        File::new(self.disk_folder.join(file_name))
    }

    /// Create the folder and any missing parents
    pub async fn setup(&self) -> Result<(), crate::errors::DeployError> {
        tokio::fs::create_dir_all(&self.disk_folder).await?;
        Ok(())
    }
}

/// Default settings file location: `$HOME/.vespa-deployer/settings.json`
pub fn default_settings_file() -> File {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    File::new(home.join(".vespa-deployer").join("settings.json"))
}
