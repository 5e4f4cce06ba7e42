//! The acquisition source: declared installs in, loadable bundles out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use plugsync_core::{PluginClass, PluginInstall, PluginManifest, PluginRef, SignatureInfo};
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheStore;
use crate::discovery::{FoundBundle, LocalDiscovery};
use crate::downloader::{DownloadOptions, Downloader, ExtractedArchive};
use crate::error::{AcquireError, AcquireResult};
use crate::metrics::DownloadMetrics;
use crate::orchestrator::DownloadOrchestrator;
use crate::resolver::VersionResolver;
use crate::version_cache::VersionCache;

/// How deep dependency chains may nest before they are treated as a cycle.
pub const MAX_DEPENDENCY_DEPTH: usize = 8;

/// Something a [`Loader`](crate::Loader) can load plugins from.
#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Class the discovered plugins are loaded as.
    fn class(&self) -> PluginClass;

    /// Signature to assume for plugins that carry none.
    fn default_signature(&self) -> Option<SignatureInfo>;

    /// Make the plugins available locally and describe them.
    async fn discover(&self) -> AcquireResult<Vec<FoundBundle>>;
}

/// The shared machinery behind every [`AcquisitionSource`].
///
/// Cheap to clone; clones share the version cache and metrics.
#[derive(Clone)]
pub struct AcquisitionContext {
    store: CacheStore,
    downloader: Arc<dyn Downloader>,
    versions: VersionCache,
    resolver: VersionResolver,
    orchestrator: DownloadOrchestrator,
    discovery: Arc<dyn LocalDiscovery>,
}

impl std::fmt::Debug for AcquisitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionContext")
            .field("store", &self.store)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

impl AcquisitionContext {
    /// Wire a cache rooted at `cache_root` to a downloader and a discovery.
    #[must_use]
    pub fn new(
        cache_root: impl Into<PathBuf>,
        downloader: Arc<dyn Downloader>,
        discovery: Arc<dyn LocalDiscovery>,
    ) -> Self {
        let store = CacheStore::new(cache_root);
        let versions = VersionCache::new();
        Self {
            resolver: VersionResolver::new(store.clone(), Arc::clone(&downloader), versions.clone()),
            orchestrator: DownloadOrchestrator::new(Arc::clone(&downloader), store.clone()),
            store,
            downloader,
            versions,
            discovery,
        }
    }

    /// Use an externally owned version cache.
    #[must_use]
    pub fn with_version_cache(mut self, versions: VersionCache) -> Self {
        self.resolver =
            VersionResolver::new(self.store.clone(), Arc::clone(&self.downloader), versions.clone());
        self.versions = versions;
        self
    }

    /// The cache store.
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The resolved-version cache.
    #[must_use]
    pub fn versions(&self) -> &VersionCache {
        &self.versions
    }

    /// The latest-version resolver.
    #[must_use]
    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// The download orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }

    /// Download metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<DownloadMetrics> {
        self.orchestrator.metrics()
    }
}

/// A [`PluginSource`] that ensures a list of declared installs are cached.
#[derive(Debug, Clone)]
pub struct AcquisitionSource {
    ctx: AcquisitionContext,
    installs: Vec<PluginInstall>,
    class: PluginClass,
    signature: Option<SignatureInfo>,
}

impl AcquisitionSource {
    /// Create a source for `installs`, loaded as `class`.
    #[must_use]
    pub fn new(ctx: AcquisitionContext, installs: Vec<PluginInstall>, class: PluginClass) -> Self {
        Self {
            ctx,
            installs,
            class,
            signature: None,
        }
    }

    /// Set the signature assumed for unsigned plugins.
    #[must_use]
    pub fn with_default_signature(mut self, signature: SignatureInfo) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Declared installs.
    #[must_use]
    pub fn installs(&self) -> &[PluginInstall] {
        &self.installs
    }

    /// Make one install available in the cache, along with its
    /// dependencies, and return every directory involved.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Duplicate`] when the plugin is already being
    /// downloaded, or the download, manifest or dependency error.
    pub async fn ensure(&self, install: &PluginInstall) -> AcquireResult<Vec<PathBuf>> {
        self.ensure_ref(install.plugin_ref(), install.url.clone(), 0)
            .await
    }

    fn ensure_ref(
        &self,
        plugin: PluginRef,
        url: Option<String>,
        depth: usize,
    ) -> BoxFuture<'_, AcquireResult<Vec<PathBuf>>> {
        Box::pin(async move {
            if depth > MAX_DEPENDENCY_DEPTH {
                return Err(AcquireError::DependencyDepth {
                    plugin_id: plugin.id,
                    limit: MAX_DEPENDENCY_DEPTH,
                });
            }
            let next = depth.saturating_add(1);

            if plugin.is_latest() {
                let key = VersionCache::key(&plugin.id, url.as_deref());
                if let Some(version) = self.ctx.versions.get(&key)
                    && let Some(path) = self.ctx.store.check(&plugin.id, &version)
                {
                    debug!(plugin_id = %plugin.id, version = %version, "latest version already cached");
                    return Ok(vec![path]);
                }
                let path = self
                    .ctx
                    .resolver
                    .resolve_and_download(&plugin.id, url.as_deref())
                    .await?;
                let archive = archive_from_dir(&path)?;
                return self.with_dependencies(archive, next).await;
            }

            if let Some(path) = self.ctx.store.check(&plugin.id, &plugin.version) {
                return Ok(vec![path]);
            }
            let opts = DownloadOptions::default().with_url(url);
            let archive = self
                .ctx
                .orchestrator
                .download_with_version(&plugin.id, &plugin.version, &opts)
                .await?;
            info!(plugin_id = %plugin.id, version = %archive.version, "plugin cached");
            self.with_dependencies(archive, next).await
        })
    }

    async fn with_dependencies(
        &self,
        archive: ExtractedArchive,
        depth: usize,
    ) -> AcquireResult<Vec<PathBuf>> {
        let deps = self
            .ctx
            .orchestrator
            .ensure_dependencies(&archive, |dep| self.ensure_ref(dep, None, depth))
            .await?;
        let mut paths = Vec::with_capacity(deps.len().saturating_add(1));
        paths.push(archive.path);
        paths.extend(deps);
        Ok(paths)
    }
}

fn archive_from_dir(path: &Path) -> AcquireResult<ExtractedArchive> {
    let manifest = PluginManifest::load_from_dir(path)?;
    Ok(ExtractedArchive {
        version: manifest.version().to_string(),
        plugin_id: manifest.id,
        path: path.to_path_buf(),
        dependencies: manifest.dependencies.plugins,
    })
}

#[async_trait]
impl PluginSource for AcquisitionSource {
    fn class(&self) -> PluginClass {
        self.class
    }

    fn default_signature(&self) -> Option<SignatureInfo> {
        self.signature.clone()
    }

    #[instrument(skip(self), fields(class = self.class.as_str(), installs = self.installs.len()))]
    async fn discover(&self) -> AcquireResult<Vec<FoundBundle>> {
        let mut paths = Vec::new();
        for install in &self.installs {
            match self.ensure(install).await {
                Ok(found) => paths.extend(found),
                Err(e) if e.is_duplicate() => {
                    debug!(plugin_id = %install.id, "skipping plugin with download in flight");
                },
                Err(e) => {
                    warn!(plugin_id = %install.id, version = %install.version, error = %e, "failed to acquire plugin");
                },
            }
        }
        paths.sort();
        paths.dedup();

        if paths.is_empty() {
            return Ok(Vec::new());
        }
        self.ctx.discovery.discover(&paths).await
    }
}
