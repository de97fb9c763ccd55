//! Zip archive assembly for generated application packages

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::DeployError;
use crate::package::ApplicationPackage;

pub const SERVICES_ENTRY: &str = "services.xml";
pub const QUERY_PROFILE_ENTRY: &str = "search/query-profiles/default.xml";
pub const QUERY_PROFILE_TYPE_ENTRY: &str = "search/query-profiles/types/root.xml";
pub const CLIENT_CERTIFICATE_ENTRY: &str = "security/clients.pem";

/// Builds the archive for one deployment call.
///
/// Archives are never patched: every call to [`ArchiveBuilder::build`]
/// produces a fresh buffer.
pub struct ArchiveBuilder<'a> {
    package: &'a ApplicationPackage,
    client_certificate: Option<String>,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(package: &'a ApplicationPackage) -> Self {
        Self {
            package,
            client_certificate: None,
        }
    }

    /// Embed a PEM certificate as `security/clients.pem` (cloud targets)
    pub fn with_client_certificate(mut self, certificate_pem: impl Into<String>) -> Self {
        self.client_certificate = Some(certificate_pem.into());
        self
    }

    /// Serialize the package into zip bytes
    pub fn build(&self) -> Result<Vec<u8>, DeployError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for schema in &self.package.schemas {
            write_entry(&mut zip, &format!("schemas/{}.sd", schema.name), schema.text.as_bytes())?;
            for model_file in &schema.model_files {
                let entry = format!("files/{}", model_file.file_name()?);
                copy_file(&mut zip, &model_file.path, &entry)?;
            }
        }

        if !self.package.models.is_empty() {
            // Dropping the directory removes whatever an exporter left behind,
            // on the error paths too.
            let export_dir = tempfile::Builder::new()
                .prefix("vespa-models-")
                .tempdir()
                .map_err(|e| DeployError::PackagingError(format!("Unable to create temporary directory: {}", e)))?;

            for (model_id, model) in &self.package.models {
                let temp_model_file = export_dir.path().join(format!("{}.onnx", model_id));
                debug!("Exporting model {} to {}", model_id, temp_model_file.display());
                model.export_to_onnx(&temp_model_file).map_err(|e| {
                    DeployError::PackagingError(format!("Unable to export model {}: {}", model_id, e))
                })?;
                copy_file(&mut zip, &temp_model_file, &format!("models/{}.onnx", model_id))?;
                std::fs::remove_file(&temp_model_file)?;
            }
        }

        if let Some(query_profile) = &self.package.query_profile {
            write_entry(&mut zip, QUERY_PROFILE_ENTRY, query_profile.profile_xml.as_bytes())?;
            write_entry(&mut zip, QUERY_PROFILE_TYPE_ENTRY, query_profile.type_xml.as_bytes())?;
        }

        write_entry(&mut zip, SERVICES_ENTRY, self.package.services_xml.as_bytes())?;

        if let Some(certificate) = &self.client_certificate {
            write_entry(&mut zip, CLIENT_CERTIFICATE_ENTRY, certificate.as_bytes())?;
        }

        finish(zip)
    }
}

pub(crate) fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

pub(crate) fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    contents: &[u8],
) -> Result<(), DeployError> {
    zip.start_file(name, options()).map_err(zip_error)?;
    zip.write_all(contents)
        .map_err(|e| DeployError::PackagingError(format!("Unable to write {}: {}", name, e)))
}

pub(crate) fn copy_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    source: &Path,
    name: &str,
) -> Result<(), DeployError> {
    let contents = std::fs::read(source).map_err(|e| {
        DeployError::PackagingError(format!("Unable to read {}: {}", source.display(), e))
    })?;
    write_entry(zip, name, &contents)
}

pub(crate) fn finish(zip: ZipWriter<Cursor<Vec<u8>>>) -> Result<Vec<u8>, DeployError> {
    Ok(zip.finish().map_err(zip_error)?.into_inner())
}

fn zip_error(err: zip::result::ZipError) -> DeployError {
    DeployError::PackagingError(err.to_string())
}

