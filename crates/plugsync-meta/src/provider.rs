//! The metadata provider contract.

use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::PluginMeta;

use crate::error::ProviderResult;

/// A provider's answer: the metadata and how long it may be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaResult {
    /// The plugin metadata.
    pub meta: PluginMeta,
    /// Cache lifetime. Zero means "do not cache".
    pub ttl: Duration,
}

impl MetaResult {
    /// Create a result with the given TTL.
    #[must_use]
    pub fn new(meta: PluginMeta, ttl: Duration) -> Self {
        Self { meta, ttl }
    }

    /// Create a result that must not be cached.
    #[must_use]
    pub fn uncached(meta: PluginMeta) -> Self {
        Self::new(meta, Duration::ZERO)
    }

    /// Whether the result may be cached.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !self.ttl.is_zero()
    }
}

/// A source of plugin metadata.
///
/// Implementations return [`ProviderError::NotFound`](crate::ProviderError::NotFound)
/// for plugins they do not know, so that a chain can fall through to the
/// next provider. They must be safe to call concurrently.
#[async_trait]
pub trait MetaProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Look up metadata for `plugin_id` at `version` (empty for latest).
    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult>;

    /// Drop expired entries from any private cache. Returns how many were
    /// removed.
    async fn sweep_expired(&self) -> usize {
        0
    }
}
