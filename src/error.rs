//! Error types for schema artifacts and comparisons

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors raised while storing, loading or comparing schema artifacts.
///
/// Every variant is fatal for the run that produced it. Soft conditions
/// (namespace drift, a missing checksum sibling, comparing a directory with
/// itself) are logged as warnings and never surface here.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Checksum mismatch for '{identifier}' ({path}): expected {expected}, computed {actual}")]
    ChecksumMismatch {
        identifier: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Compatibility check failed for '{identifier}': {reason}")]
    Oracle { identifier: String, reason: String },

    #[error("Failed to fetch table schemas: {0}")]
    Fetch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SchemaError {
    /// Build a parse error for the given file
    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SchemaError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error was caused by how the tool was invoked rather than by the data
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SchemaError::InvalidInput(_))
    }
}
