//! Resolution of "latest" plugin versions.
//!
//! The concrete version of a latest request is only known once the archive
//! has been unpacked, so the download goes to a private temp directory
//! first and is renamed into its versioned slot afterwards. Concurrent
//! resolvers for the same plugin race on the rename; the loser discards its
//! copy and returns the winner's directory.

use std::path::PathBuf;
use std::sync::Arc;

use plugsync_core::PluginManifest;
use tracing::info;

use crate::cache::CacheStore;
use crate::downloader::{DownloadOptions, Downloader};
use crate::error::{AcquireError, AcquireResult};
use crate::staging::{self, TempDirGuard, temp_dir_path};
use crate::version_cache::VersionCache;

/// Downloads latest-version requests and files them under their concrete
/// version.
#[derive(Clone)]
pub struct VersionResolver {
    store: CacheStore,
    downloader: Arc<dyn Downloader>,
    versions: VersionCache,
}

impl std::fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionResolver")
            .field("root", &self.store.root())
            .field("resolved", &self.versions.len())
            .finish_non_exhaustive()
    }
}

impl VersionResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(store: CacheStore, downloader: Arc<dyn Downloader>, versions: VersionCache) -> Self {
        Self {
            store,
            downloader,
            versions,
        }
    }

    /// The shared version cache.
    #[must_use]
    pub fn versions(&self) -> &VersionCache {
        &self.versions
    }

    /// Download the latest version of `plugin_id` and return its cached path.
    ///
    /// # Errors
    ///
    /// Propagates [`AcquireError::Duplicate`] unchanged, without recording a
    /// version. Download, manifest and filesystem failures are returned as
    /// is; the temp directory is removed on every failure path.
    pub async fn resolve_and_download(
        &self,
        plugin_id: &str,
        url: Option<&str>,
    ) -> AcquireResult<PathBuf> {
        let root = self.store.root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| AcquireError::io(root, e))?;

        let mut guard = TempDirGuard::new(temp_dir_path(root, plugin_id));
        let opts = DownloadOptions::new(guard.path()).with_url(url.map(str::to_string));
        self.downloader.download(plugin_id, "", &opts).await?;

        let manifest = PluginManifest::load_from_dir(guard.path())?;
        if manifest.id != plugin_id {
            return Err(AcquireError::ManifestMismatch {
                expected: plugin_id.to_string(),
                found: manifest.id,
            });
        }
        let version = manifest.version().to_string();
        if version.is_empty() {
            return Err(AcquireError::Extraction {
                message: format!("{plugin_id} manifest declares no version"),
            });
        }

        self.versions
            .insert(VersionCache::key(plugin_id, url), version.clone());

        let target = self.store.versioned_dir(plugin_id, &version);
        let path = staging::promote(&mut guard, &target, plugin_id, &version).await?;
        info!(plugin_id, version = %version, dir = %path.display(), "resolved latest version");
        Ok(path)
    }
}
