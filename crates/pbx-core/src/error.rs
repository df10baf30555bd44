//! Error types for pbx-core

use std::path::PathBuf;

use crate::model::Field;

/// Result type for pbx-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pbx-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine did not answer, or not within the timeout
    #[error("Engine unreachable: {message}")]
    EngineUnreachable { message: String },

    /// The engine answered with output we could not interpret
    #[error("Unexpected engine output: {message}")]
    EngineProtocol { message: String },

    /// The engine rejected a reload; `output` is its raw text
    #[error("Engine reload failed: {output}")]
    Reload { output: String },

    /// The record repository failed
    #[error("Record repository error: {message}")]
    Repository { message: String },

    /// Entity not found
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// Id that cannot be used as a configuration section name
    #[error("Invalid extension id '{id}'")]
    InvalidId { id: String },

    /// Record field that cannot be written as a configuration value
    #[error("Invalid {field} for extension '{id}': {reason}")]
    InvalidValue { id: String, field: Field, reason: String },

    /// Entity changed since it was reconciled
    #[error("Conflict on {id}: {message}")]
    Conflict { id: String, message: String },

    /// Invalid settings file
    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// A background task panicked or was aborted
    #[error("Internal error: {0}")]
    Internal(String),

    // Transparent wrappers for underlying crate errors
    /// Configuration file error from pbx-config (parse, write, conflict)
    #[error(transparent)]
    ConfigFile(#[from] pbx_config::Error),

    /// Filesystem error from pbx-fs
    #[error(transparent)]
    Fs(#[from] pbx_fs::Error),
}

impl Error {
    pub(crate) fn repository(message: impl std::fmt::Display) -> Self {
        Error::Repository {
            message: message.to_string(),
        }
    }
}
