//! Ordered provider chain with a shared TTL cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::{PluginMeta, cache_key};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{MetaProvider, MetaResult};

/// Default interval between sweeps of expired cache entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct CachedMetaEntry {
    meta: PluginMeta,
    ttl: Duration,
    expires_at: Instant,
}

impl CachedMetaEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Consults metadata providers in order and caches their answers.
///
/// A live cache entry answers without consulting any provider. On a miss
/// the providers are asked in construction order: the first success wins,
/// `NotFound` falls through silently, and any other error is remembered and
/// surfaced only if nothing later succeeds.
pub struct ProviderManager {
    providers: Vec<Arc<dyn MetaProvider>>,
    cache: RwLock<HashMap<String, CachedMetaEntry>>,
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ProviderManager")
            .field("providers", &names)
            .finish_non_exhaustive()
    }
}

impl ProviderManager {
    /// Create a manager over an ordered provider list.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoProviders`] if `providers` is empty.
    pub fn new(providers: Vec<Arc<dyn MetaProvider>>) -> ProviderResult<Self> {
        if providers.is_empty() {
            return Err(ProviderError::NoProviders);
        }
        info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "metadata provider chain ready"
        );
        Ok(Self {
            providers,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Number of cached entries, live or not yet swept.
    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Remove every expired cache entry. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(cache.len());
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "swept expired metadata");
        }
        removed
    }

    /// Ask every provider to drop its own expired entries. Returns how many
    /// were removed in total.
    pub async fn sweep_providers(&self) -> usize {
        let mut removed = 0usize;
        for provider in &self.providers {
            let swept = provider.sweep_expired().await;
            if swept > 0 {
                debug!(provider = provider.name(), removed = swept, "swept provider cache");
            }
            removed = removed.saturating_add(swept);
        }
        removed
    }

    /// Run [`sweep_expired`](Self::sweep_expired) and
    /// [`sweep_providers`](Self::sweep_providers) every `interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let start = Instant::now().checked_add(interval).unwrap_or_else(Instant::now);
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("metadata sweeper stopped");
                        break;
                    },
                    _ = ticker.tick() => {
                        manager.sweep_expired().await;
                        manager.sweep_providers().await;
                    },
                }
            }
        })
    }

    async fn cached(&self, key: &str) -> Option<MetaResult> {
        let now = Instant::now();
        let expired = {
            let cache = self.cache.read().await;
            match cache.get(key) {
                Some(entry) if entry.is_live(now) => {
                    return Some(MetaResult::new(entry.meta.clone(), entry.ttl));
                },
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut cache = self.cache.write().await;
            if cache.get(key).is_some_and(|e| !e.is_live(now)) {
                cache.remove(key);
            }
        }
        None
    }

    async fn store(&self, key: String, result: &MetaResult) {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(result.ttl) else {
            return;
        };
        self.cache.write().await.insert(
            key,
            CachedMetaEntry {
                meta: result.meta.clone(),
                ttl: result.ttl,
                expires_at,
            },
        );
    }
}

#[async_trait]
impl MetaProvider for ProviderManager {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult> {
        let key = cache_key(plugin_id, version);
        if let Some(hit) = self.cached(&key).await {
            debug!(plugin_id, version, "metadata cache hit");
            return Ok(hit);
        }

        let mut last_err: Option<ProviderError> = None;
        for provider in &self.providers {
            match provider.get_meta(plugin_id, version).await {
                Ok(result) => {
                    debug!(
                        plugin_id,
                        version,
                        provider = provider.name(),
                        ttl_secs = result.ttl.as_secs(),
                        "metadata resolved"
                    );
                    if result.is_cacheable() {
                        self.store(key, &result).await;
                    }
                    return Ok(result);
                },
                Err(e) if e.is_not_found() => {
                    debug!(plugin_id, version, provider = provider.name(), "not found");
                },
                Err(e) => {
                    warn!(
                        plugin_id,
                        version,
                        provider = provider.name(),
                        error = %e,
                        "metadata provider failed"
                    );
                    last_err = Some(e);
                },
            }
        }

        Err(match last_err {
            Some(source) => ProviderError::Chain {
                plugin_id: plugin_id.to_string(),
                version: version.to_string(),
                source: Box::new(source),
            },
            None => ProviderError::not_found(plugin_id, version),
        })
    }
}
