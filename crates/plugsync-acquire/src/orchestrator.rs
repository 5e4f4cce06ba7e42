//! Single-download coordination and dependency fan-out.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use plugsync_core::PluginRef;
use tracing::{debug, instrument, warn};

use crate::cache::CacheStore;
use crate::downloader::{DownloadOptions, Downloader, ExtractedArchive};
use crate::error::{AcquireError, AcquireResult};
use crate::metrics::{DownloadMetrics, Outcome};
use crate::staging::{self, TempDirGuard, temp_dir_path};

/// Wraps a [`Downloader`] with tracing, metrics and dependency handling.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    downloader: Arc<dyn Downloader>,
    store: CacheStore,
    metrics: Arc<DownloadMetrics>,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("root", &self.store.root())
            .finish_non_exhaustive()
    }
}

impl DownloadOrchestrator {
    /// Create an orchestrator with fresh metrics.
    #[must_use]
    pub fn new(downloader: Arc<dyn Downloader>, store: CacheStore) -> Self {
        Self {
            downloader,
            store,
            metrics: Arc::new(DownloadMetrics::new()),
        }
    }

    /// Share an existing metrics instance.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<DownloadMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics recorded by this orchestrator.
    #[must_use]
    pub fn metrics(&self) -> &Arc<DownloadMetrics> {
        &self.metrics
    }

    /// Download `plugin_id` at `version` into `target_dir`.
    ///
    /// `target_dir` overrides whatever `opts` carries.
    ///
    /// # Errors
    ///
    /// Returns the downloader's error. [`AcquireError::Duplicate`] is
    /// forwarded unchanged.
    #[instrument(skip(self, target_dir, opts), fields(target = %target_dir.display()))]
    pub async fn download_to_dir(
        &self,
        plugin_id: &str,
        version: &str,
        target_dir: PathBuf,
        opts: &DownloadOptions,
    ) -> AcquireResult<ExtractedArchive> {
        let opts = DownloadOptions {
            url: opts.url.clone(),
            target_dir,
        };

        self.metrics.record_attempt();
        let started = Instant::now();
        let result = self.downloader.download(plugin_id, version, &opts).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(archive) => {
                self.metrics
                    .record_outcome(plugin_id, &archive.version, Outcome::Success, elapsed);
            },
            Err(e) if e.is_duplicate() => {
                debug!(plugin_id, version, "download already in flight");
                self.metrics
                    .record_outcome(plugin_id, version, Outcome::Duplicate, elapsed);
            },
            Err(e) => {
                warn!(plugin_id, version, error = %e, "download failed");
                self.metrics
                    .record_outcome(plugin_id, version, Outcome::Failure, elapsed);
            },
        }
        result
    }

    /// Download an explicit version into its versioned cache directory.
    ///
    /// The download lands in a `.tmp-` directory and is renamed into the
    /// slot only after its manifest matches, so a failed or cancelled
    /// download never leaves a partial plugin where the cache looks.
    ///
    /// # Errors
    ///
    /// See [`download_to_dir`](Self::download_to_dir). A download of the
    /// wrong plugin or version fails with [`AcquireError::ManifestMismatch`]
    /// or [`AcquireError::VersionMismatch`].
    pub async fn download_with_version(
        &self,
        plugin_id: &str,
        version: &str,
        opts: &DownloadOptions,
    ) -> AcquireResult<ExtractedArchive> {
        let root = self.store.root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| AcquireError::io(root, e))?;

        let mut staged = TempDirGuard::new(temp_dir_path(root, plugin_id));
        let mut archive = self
            .download_to_dir(plugin_id, version, staged.path().to_path_buf(), opts)
            .await?;
        if archive.plugin_id != plugin_id {
            return Err(AcquireError::ManifestMismatch {
                expected: plugin_id.to_string(),
                found: archive.plugin_id,
            });
        }
        if archive.version != version {
            return Err(AcquireError::VersionMismatch {
                plugin_id: plugin_id.to_string(),
                expected: version.to_string(),
                found: archive.version,
            });
        }

        let target = self.store.versioned_dir(plugin_id, version);
        archive.path = staging::promote(&mut staged, &target, plugin_id, version).await?;
        Ok(archive)
    }

    /// Run `ensure` for every dependency `archive` declares and collect the
    /// paths it returns.
    ///
    /// A dependency reported as [`AcquireError::Duplicate`] is already being
    /// fetched by someone else and counts as ensured.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Dependency`] for the first dependency that
    /// fails.
    pub async fn ensure_dependencies<F, Fut>(
        &self,
        archive: &ExtractedArchive,
        mut ensure: F,
    ) -> AcquireResult<Vec<PathBuf>>
    where
        F: FnMut(PluginRef) -> Fut,
        Fut: Future<Output = AcquireResult<Vec<PathBuf>>>,
    {
        let mut paths = Vec::new();
        for dep in &archive.dependencies {
            match ensure(dep.clone()).await {
                Ok(found) => paths.extend(found),
                Err(e) if e.is_duplicate() => {
                    debug!(plugin_id = %archive.plugin_id, dependency = %dep, "dependency already in flight");
                },
                Err(e) => {
                    return Err(AcquireError::Dependency {
                        plugin_id: archive.plugin_id.clone(),
                        dependency: dep.to_string(),
                        source: Box::new(e),
                    });
                },
            }
        }
        Ok(paths)
    }
}
