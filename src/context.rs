//! Resume text loading.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("unsupported file type: {extension} (expected .txt or .md)")]
    UnsupportedExtension { extension: String },

    #[error("resume file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("read resume file: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Loads trimmed resume text. An empty path means no resume.
pub fn load_context(path: &Path) -> Result<String, ContextError> {
    if path.as_os_str().is_empty() {
        return Ok(String::new());
    }

    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        let extension = if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        };
        return Err(ContextError::UnsupportedExtension { extension });
    }

    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Err(ContextError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(ContextError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
