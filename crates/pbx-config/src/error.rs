//! Error types for pbx-config

use std::path::PathBuf;

/// Result type for pbx-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pbx-config operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed section header
    #[error("Failed to parse {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The file was not written; its previous content is intact
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: pbx_fs::Error,
    },

    /// The file changed between load and write
    #[error("{path} changed since it was loaded (expected {expected}, found {actual})")]
    Conflict {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Fs(#[from] pbx_fs::Error),
}
