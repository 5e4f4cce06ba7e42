//! Install error types.

use std::time::Duration;

use plugsync_acquire::AcquireError;
use plugsync_core::{CoreError, ResourceKey};
use plugsync_meta::ProviderError;
use thiserror::Error;

/// Errors from the install record store.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No record under this key.
    #[error("install record {key} not found")]
    NotFound {
        /// Requested key.
        key: ResourceKey,
    },

    /// The record changed since it was read.
    #[error("install record {key} changed (have version {expected}, store has {actual})")]
    Conflict {
        /// Record key.
        key: ResourceKey,
        /// Resource version the writer held.
        expected: String,
        /// Resource version in the store.
        actual: String,
    },

    /// A record already exists under this key.
    #[error("install record {key} already exists")]
    AlreadyExists {
        /// Record key.
        key: ResourceKey,
    },

    /// The store itself failed.
    #[error("record store error: {0}")]
    Backend(String),
}

impl ClientError {
    /// Whether this is [`ClientError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is [`ClientError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for record store operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors from registering and reconciling installs.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The record names a source type this node does not know.
    #[error("install {plugin_id} has unknown source type: {source}")]
    UnknownSourceType {
        /// Plugin being installed.
        plugin_id: String,
        /// Why the value was rejected.
        #[source]
        source: CoreError,
    },

    /// The source type needs an option the record does not set.
    #[error("install {plugin_id} with source type {source_type} requires `{option}`")]
    MissingOption {
        /// Plugin being installed.
        plugin_id: String,
        /// Declared source type.
        source_type: &'static str,
        /// Missing option.
        option: &'static str,
    },

    /// The source type is recognised but has no install strategy.
    #[error("install {plugin_id}: source type {source_type} is not supported")]
    UnsupportedSource {
        /// Plugin being installed.
        plugin_id: String,
        /// Declared source type.
        source_type: &'static str,
    },

    /// The installer reported success but the plugin is not registered.
    #[error("plugin {plugin_id}@{version} is not registered after install")]
    NotRegistered {
        /// Plugin ID.
        plugin_id: String,
        /// Desired version.
        version: String,
    },

    /// Removing the plugin failed; retry after the given delay.
    #[error("failed to remove plugin {plugin_id}: {source}")]
    Remove {
        /// Plugin ID.
        plugin_id: String,
        /// Suggested requeue delay.
        requeue_after: Duration,
        /// Why removal failed.
        #[source]
        source: AcquireError,
    },

    /// Handling one event exceeded its deadline.
    #[error("reconciling {plugin_id} timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Plugin ID.
        plugin_id: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// Acquisition failed.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// The record store failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Metadata lookup failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl InstallError {
    /// Delay after which the event should be retried, if the error carries one.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Remove { requeue_after, .. } => Some(*requeue_after),
            _ => None,
        }
    }
}

/// Result type for install operations.
pub type InstallResult<T> = Result<T, InstallError>;
