use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::{PluginManifest, PluginMeta, SignatureInfo, cache_key};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{DEFAULT_TIMEOUT, build_client, endpoint, get_json};
use crate::provider::{MetaProvider, MetaResult};

/// Default TTL for catalog answers.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(3600);

const NAME: &str = "catalog";

/// One version document from the catalog API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogVersion {
    json: PluginManifest,
    #[serde(default)]
    cdn_url: Option<String>,
    #[serde(default)]
    signature_type: Option<String>,
    #[serde(default)]
    signature_org: Option<String>,
    #[serde(default)]
    children: Vec<CatalogChild>,
}

/// Children are listed either as bare IDs or as objects carrying an ID.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogChild {
    Id(String),
    Plugin { id: String },
}

impl CatalogChild {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Plugin { id } => id,
        }
    }
}

impl CatalogVersion {
    fn into_meta(self, requested_version: &str) -> PluginMeta {
        let mut meta = PluginMeta::from_manifest(&self.json);
        if meta.version.is_empty() {
            meta.version = requested_version.to_string();
        }
        meta.cdn_url = self.cdn_url.filter(|u| !u.is_empty());
        if self.signature_type.is_some() || self.signature_org.is_some() {
            meta.signature = Some(SignatureInfo {
                signature_type: self.signature_type.unwrap_or_default(),
                signature_org: self.signature_org.unwrap_or_default(),
            });
        }
        meta.children = self.children.into_iter().map(CatalogChild::into_id).collect();
        meta
    }
}

/// Answers from the public plugin catalog.
///
/// One GET per miss to `{api_base}/{plugin_id}/versions/{version}`; answers
/// are kept in a private cache for the provider TTL.
pub struct CatalogProvider {
    client: reqwest::Client,
    api_base: String,
    ttl: Duration,
    /// Answers keyed by `id:version`, with their expiry.
    cache: RwLock<HashMap<String, (PluginMeta, Instant)>>,
}

impl std::fmt::Debug for CatalogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogProvider")
            .field("api_base", &self.api_base)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CatalogProvider {
    /// Create a provider with the default timeout and TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Upstream`] if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>) -> ProviderResult<Self> {
        Ok(Self {
            client: build_client(NAME, DEFAULT_TIMEOUT)?,
            api_base: api_base.into(),
            ttl: DEFAULT_CATALOG_TTL,
            cache: RwLock::new(HashMap::new()),
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

    /// Override the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cached answer for `key`. An expired entry is removed on the way.
    async fn cached(&self, key: &str) -> Option<PluginMeta> {
        let now = Instant::now();
        {
            let cache = self.cache.read().await;
            match cache.get(key) {
                Some((meta, expires_at)) if now < *expires_at => return Some(meta.clone()),
                Some(_) => {},
                None => return None,
            }
        }
        let mut cache = self.cache.write().await;
        if cache.get(key).is_some_and(|(_, expires_at)| now >= *expires_at) {
            cache.remove(key);
        }
        None
    }

    async fn remember(&self, key: String, meta: PluginMeta) {
        if let Some(expires_at) = Instant::now().checked_add(self.ttl)
            && !self.ttl.is_zero()
        {
            self.cache.write().await.insert(key, (meta, expires_at));
        }
    }
}

#[async_trait]
impl MetaProvider for CatalogProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult> {
        let key = cache_key(plugin_id, version);
        if let Some(meta) = self.cached(&key).await {
            return Ok(MetaResult::new(meta, self.ttl));
        }

        let version_segment = if version.is_empty() { "latest" } else { version };
        let url = endpoint(NAME, &self.api_base, &[plugin_id, "versions", version_segment])?;
        let doc: CatalogVersion = get_json(&self.client, NAME, url)
            .await?
            .ok_or_else(|| ProviderError::not_found(plugin_id, version))?;

        let meta = doc.into_meta(version);
        if meta.id != plugin_id {
            return Err(ProviderError::Decode {
                provider: NAME,
                message: format!("asked for {plugin_id}, catalog answered with {}", meta.id),
            });
        }

        self.remember(key, meta.clone()).await;
        Ok(MetaResult::new(meta, self.ttl))
    }

    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, (_, expires_at)| now < *expires_at);
        before.saturating_sub(cache.len())
    }
}
