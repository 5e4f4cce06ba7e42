use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::PluginRegistry;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{MetaProvider, MetaResult};

/// Default TTL for answers from the local registry.
pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(3600);

/// Answers from the plugins already loaded on this node. No network.
pub struct LocalProvider {
    registry: Arc<dyn PluginRegistry>,
    ttl: Duration,
}

impl LocalProvider {
    /// Create a provider over the node's registry.
    #[must_use]
    pub fn new(registry: Arc<dyn PluginRegistry>) -> Self {
        Self {
            registry,
            ttl: DEFAULT_LOCAL_TTL,
        }
    }

    /// Override the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl MetaProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult> {
        let plugin = self
            .registry
            .plugin(plugin_id, version)
            .await
            .ok_or_else(|| ProviderError::not_found(plugin_id, version))?;

        let mut meta = plugin.meta;
        meta.class.get_or_insert(plugin.class);
        Ok(MetaResult::new(meta, self.ttl))
    }
}
