//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Strip the tag from an image reference.
///
/// A colon only separates a tag when it comes after the last path separator,
/// so registry ports such as `localhost:5000/vespa` are left alone.
pub fn image_repository(image: &str) -> &str {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].find(':') {
        Some(colon) => &image[..name_start + colon],
        None => image,
    }
}

/// Indent every continuation line of a multi-line message
pub fn indent_continuation(message: &str, width: usize) -> String {
    message.replace('\n', &format!("\n{}", " ".repeat(width)))
}
