//! Archives built from an application directory on disk

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipWriter;

use crate::errors::DeployError;
use crate::package::archive::{copy_file, finish, write_entry};

/// Zip every file below `root`, with entry names relative to `root` itself
pub fn zip_directory(root: &Path) -> Result<Vec<u8>, DeployError> {
    zip_directory_with(root, &[])
}

/// Like [`zip_directory`], adding `extra` entries after the directory contents.
/// An extra entry replaces a file of the same name found on disk.
pub fn zip_directory_with(root: &Path, extra: &[(&str, &[u8])]) -> Result<Vec<u8>, DeployError> {
    if !root.is_dir() {
        return Err(DeployError::PackagingError(format!(
            "Application root is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for file in &files {
        let entry = entry_name(root, file)?;
        if extra.iter().any(|(name, _)| *name == entry) {
            continue;
        }
        debug!("Adding {} to application archive", entry);
        copy_file(&mut zip, file, &entry)?;
    }
    for (name, contents) in extra {
        write_entry(&mut zip, name, contents)?;
    }

    finish(zip)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), DeployError> {
    let entries = std::fs::read_dir(dir).map_err(|e| unreadable(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| unreadable(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| unreadable(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() || path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, file: &Path) -> Result<String, DeployError> {
    let relative = file.strip_prefix(root).map_err(|_| {
        DeployError::PackagingError(format!("{} is outside {}", file.display(), root.display()))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn unreadable(path: &Path, err: std::io::Error) -> DeployError {
    DeployError::PackagingError(format!("Unable to read {}: {}", path.display(), err))
}
