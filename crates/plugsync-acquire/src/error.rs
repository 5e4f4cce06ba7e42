//! Acquisition error types.

use std::path::PathBuf;

use plugsync_core::CoreError;
use thiserror::Error;

/// Errors from downloading, caching, discovering and loading plugins.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// An equivalent download is already in flight.
    ///
    /// This is a coordination signal, not a failure: callers skip the
    /// plugin and let the in-flight download finish.
    #[error("download of {plugin_id}:{version} already in progress")]
    Duplicate {
        /// Plugin being downloaded.
        plugin_id: String,
        /// Requested version (may be empty).
        version: String,
    },

    /// The artifact server failed or answered with an unexpected status.
    #[error("HTTP error fetching {url}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Error description.
        message: String,
    },

    /// The archive exceeds the configured size limit.
    #[error("archive is {size} bytes, limit is {limit}")]
    ArchiveTooLarge {
        /// Observed size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The archive could not be decompressed or unpacked.
    #[error("extraction failed: {message}")]
    Extraction {
        /// Error description.
        message: String,
    },

    /// An archive entry tried to escape the target directory.
    #[error("archive entry escapes target directory: {path}")]
    PathTraversal {
        /// Offending entry path.
        path: String,
    },

    /// An archive entry is a link, device or other unsupported type.
    #[error("unsupported archive entry {entry_type} at {path}")]
    UnsafeEntry {
        /// Entry type as reported by the archive.
        entry_type: String,
        /// Entry path.
        path: String,
    },

    /// A plugin manifest was missing or malformed.
    #[error(transparent)]
    Manifest(#[from] CoreError),

    /// A downloaded plugin is not the one that was asked for.
    #[error("expected plugin {expected}, archive contains {found}")]
    ManifestMismatch {
        /// Requested plugin ID.
        expected: String,
        /// ID found in the archive's manifest.
        found: String,
    },

    /// A pinned download unpacked to a different version than requested.
    #[error("expected {plugin_id} {expected}, archive contains {found}")]
    VersionMismatch {
        /// Requested plugin ID.
        plugin_id: String,
        /// Requested version.
        expected: String,
        /// Version found in the archive's manifest.
        found: String,
    },

    /// A filesystem operation on the cache failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A declared dependency could not be ensured.
    #[error("dependency {dependency} of {plugin_id} failed: {source}")]
    Dependency {
        /// Plugin declaring the dependency.
        plugin_id: String,
        /// The dependency reference.
        dependency: String,
        /// Why it failed.
        #[source]
        source: Box<AcquireError>,
    },

    /// Dependencies nest deeper than allowed (usually a cycle).
    #[error("dependency chain of {plugin_id} exceeds depth {limit}")]
    DependencyDepth {
        /// Plugin at which the limit was hit.
        plugin_id: String,
        /// Maximum depth.
        limit: usize,
    },

    /// The loader rejected a plugin.
    #[error("failed to load {plugin_id}: {message}")]
    Load {
        /// Plugin being loaded.
        plugin_id: String,
        /// Failure reason.
        message: String,
    },

    /// The loader produced nothing for the requested plugin.
    #[error("plugin {plugin_id} was not loaded")]
    NotLoaded {
        /// Requested plugin.
        plugin_id: String,
    },
}

impl AcquireError {
    /// Whether this is the [`AcquireError::Duplicate`] signal.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for acquisition operations.
pub type AcquireResult<T> = Result<T, AcquireError>;
