//! Metadata provider errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by metadata providers and the provider chain.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider does not know this plugin (or this version of it).
    ///
    /// The chain treats this as "ask the next provider".
    #[error("plugin {plugin_id} version {version:?} not found")]
    NotFound {
        /// Requested plugin ID.
        plugin_id: String,
        /// Requested version (may be empty).
        version: String,
    },

    /// The upstream service failed or answered with an unexpected status.
    #[error("{provider} upstream error: {message}")]
    Upstream {
        /// Provider name.
        provider: &'static str,
        /// Error description.
        message: String,
    },

    /// The upstream answered with a payload that could not be decoded.
    #[error("{provider} returned an undecodable payload: {message}")]
    Decode {
        /// Provider name.
        provider: &'static str,
        /// Decode error description.
        message: String,
    },

    /// The bundled plugin directory could not be scanned.
    #[error("failed to scan {path}: {message}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// Every provider was consulted and the last hard error is attached.
    #[error("no provider could resolve {plugin_id}:{version}: {source}")]
    Chain {
        /// Requested plugin ID.
        plugin_id: String,
        /// Requested version.
        version: String,
        /// Last non-NotFound error seen in the chain.
        #[source]
        source: Box<ProviderError>,
    },

    /// A provider manager was built with no providers.
    #[error("at least one metadata provider is required")]
    NoProviders,
}

impl ProviderError {
    /// Build a [`ProviderError::NotFound`].
    #[must_use]
    pub fn not_found(plugin_id: &str, version: &str) -> Self {
        Self::NotFound {
            plugin_id: plugin_id.to_string(),
            version: version.to_string(),
        }
    }

    /// Whether this is the "absent" sentinel.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
