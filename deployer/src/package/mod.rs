//! Application package inputs and archive assembly
//!
//! The package content itself (schema text, services descriptor, query
//! profiles, model export) is produced elsewhere; this module only consumes
//! it and lays it out inside a zip archive.

pub mod archive;
pub mod disk;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::DeployError;

/// A model file referenced by a schema, copied into `files/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    pub path: PathBuf,
}

impl ModelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Name of the entry under `files/`
    pub fn file_name(&self) -> Result<String, DeployError> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DeployError::PackagingError(format!(
                    "Model path has no file name: {}",
                    self.path.display()
                ))
            })
    }
}

/// A rendered schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    pub text: String,
    pub model_files: Vec<ModelFile>,
}

impl Schema {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            model_files: Vec::new(),
        }
    }

    pub fn with_model_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_files.push(ModelFile::new(path));
        self
    }
}

/// Rendered query profile and its type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryProfile {
    pub profile_xml: String,
    pub type_xml: String,
}

/// A model able to write itself to an ONNX file
pub trait ModelExporter: Send + Sync {
    fn export_to_onnx(&self, output_path: &Path) -> Result<(), DeployError>;
}

/// Everything needed to build a deployable archive
pub struct ApplicationPackage {
    pub name: String,
    pub schemas: Vec<Schema>,
    pub models: BTreeMap<String, Box<dyn ModelExporter>>,
    pub query_profile: Option<QueryProfile>,
    pub services_xml: String,
}

impl ApplicationPackage {
    /// Create a package with a services descriptor and nothing else
    pub fn new(name: impl Into<String>, services_xml: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: Vec::new(),
            models: BTreeMap::new(),
            query_profile: None,
            services_xml: services_xml.into(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>, model: impl ModelExporter + 'static) -> Self {
        self.models.insert(model_id.into(), Box::new(model));
        self
    }

    pub fn with_query_profile(mut self, query_profile: QueryProfile) -> Self {
        self.query_profile = Some(query_profile);
        self
    }
}

impl std::fmt::Debug for ApplicationPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationPackage")
            .field("name", &self.name)
            .field("schemas", &self.schemas.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("query_profile", &self.query_profile.is_some())
            .finish()
    }
}

/// `<application>_container`
pub fn container_cluster(application_name: &str) -> String {
    format!("{}_container", application_name)
}
