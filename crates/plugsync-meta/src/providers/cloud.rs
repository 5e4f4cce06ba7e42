use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::PluginMeta;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{DEFAULT_TIMEOUT, build_client, endpoint, get_json};
use crate::provider::{MetaProvider, MetaResult};

/// Default lifetime of one inventory snapshot.
pub const DEFAULT_CLOUD_TTL: Duration = Duration::from_secs(300);

const NAME: &str = "cloud";

struct Snapshot {
    plugins: HashMap<String, PluginMeta>,
    fetched_at: Instant,
}

/// Answers from the cloud stack's plugin inventory.
///
/// `GET {api_base}/plugins` returns every plugin the stack has; the whole
/// list is kept as one snapshot for the TTL and lookups are served from it.
pub struct CloudProvider {
    client: reqwest::Client,
    api_base: String,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl CloudProvider {
    /// Create a provider with the default timeout and TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Upstream`] if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>) -> ProviderResult<Self> {
        Ok(Self {
            client: build_client(NAME, DEFAULT_TIMEOUT)?,
            api_base: api_base.into(),
            ttl: DEFAULT_CLOUD_TTL,
            snapshot: RwLock::new(None),
        })
    }

    /// Override the request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Upstream`] if the HTTP client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> ProviderResult<Self> {
        self.client = build_client(NAME, timeout)?;
        Ok(self)
    }

    /// Override the snapshot TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn is_fresh(&self, snapshot: Option<&Snapshot>) -> bool {
        snapshot.is_some_and(|s| s.fetched_at.elapsed() < self.ttl)
    }

    async fn lookup(&self, plugin_id: &str) -> ProviderResult<Option<PluginMeta>> {
        {
            let snapshot = self.snapshot.read().await;
            if self.is_fresh(snapshot.as_ref()) {
                return Ok(snapshot.as_ref().and_then(|s| s.plugins.get(plugin_id).cloned()));
            }
        }

        let mut snapshot = self.snapshot.write().await;
        if !self.is_fresh(snapshot.as_ref()) {
            let url = endpoint(NAME, &self.api_base, &["plugins"])?;
            let list: Vec<PluginMeta> =
                get_json(&self.client, NAME, url)
                    .await?
                    .ok_or_else(|| ProviderError::Upstream {
                        provider: NAME,
                        message: "plugin inventory endpoint not found".to_string(),
                    })?;
            debug!(plugins = list.len(), "refreshed cloud plugin inventory");
            *snapshot = Some(Snapshot {
                plugins: list.into_iter().map(|m| (m.id.clone(), m)).collect(),
                fetched_at: Instant::now(),
            });
        }
        Ok(snapshot.as_ref().and_then(|s| s.plugins.get(plugin_id).cloned()))
    }
}

#[async_trait]
impl MetaProvider for CloudProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult> {
        let meta = self
            .lookup(plugin_id)
            .await?
            .filter(|m| version.is_empty() || m.version == version)
            .ok_or_else(|| ProviderError::not_found(plugin_id, version))?;
        Ok(MetaResult::new(meta, self.ttl))
    }
}
