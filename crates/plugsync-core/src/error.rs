//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from core plugin type operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A manifest file could not be read.
    #[error("failed to read manifest at {path}: {source}")]
    ManifestRead {
        /// Path to the manifest file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest file could not be parsed.
    #[error("manifest parse error in {path}: {message}")]
    ManifestParse {
        /// Path to the manifest file.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// A string could not be parsed into a known enum value.
    #[error("invalid {kind}: {value}")]
    InvalidValue {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
