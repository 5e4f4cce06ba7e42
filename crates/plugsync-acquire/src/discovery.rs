//! Turning ensured cache directories into loadable plugin bundles.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use plugsync_core::{MANIFEST_FILE_NAME, PluginManifest};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AcquireError, AcquireResult};

/// A plugin found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundPlugin {
    /// Its manifest.
    pub manifest: PluginManifest,
    /// Directory holding `plugin.json`.
    pub dir: PathBuf,
}

/// A top-level plugin and the child plugins nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundBundle {
    /// The plugin at the bundle root.
    pub primary: FoundPlugin,
    /// Plugins in subdirectories of the root.
    pub children: Vec<FoundPlugin>,
}

impl FoundBundle {
    /// ID of the primary plugin.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.primary.manifest.id
    }

    /// Version of the primary plugin.
    #[must_use]
    pub fn version(&self) -> &str {
        self.primary.manifest.version()
    }
}

/// Scans plugin directories.
#[async_trait]
pub trait LocalDiscovery: Send + Sync {
    /// Read one bundle per path.
    async fn discover(&self, paths: &[PathBuf]) -> AcquireResult<Vec<FoundBundle>>;
}

/// [`LocalDiscovery`] over the local filesystem.
///
/// Children are plugins up to two levels below the root that carry their
/// own `plugin.json`. Unreadable roots and children are logged and skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDiscovery;

impl FsDiscovery {
    /// Create a filesystem discovery.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn scan(path: &Path) -> Option<FoundBundle> {
        let manifest = match PluginManifest::load_from_dir(path) {
            Ok(m) => m,
            Err(e) => {
                warn!(dir = %path.display(), error = %e, "skipping directory without a usable manifest");
                return None;
            },
        };

        let children = WalkDir::new(path)
            .min_depth(2)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILE_NAME)
            .filter_map(|e| {
                let dir = e.path().parent()?.to_path_buf();
                match PluginManifest::load(e.path()) {
                    Ok(manifest) => Some(FoundPlugin { manifest, dir }),
                    Err(err) => {
                        warn!(path = %e.path().display(), error = %err, "skipping unreadable child manifest");
                        None
                    },
                }
            })
            .collect::<Vec<_>>();

        debug!(
            plugin_id = %manifest.id,
            dir = %path.display(),
            children = children.len(),
            "discovered plugin"
        );
        Some(FoundBundle {
            primary: FoundPlugin {
                manifest,
                dir: path.to_path_buf(),
            },
            children,
        })
    }
}

#[async_trait]
impl LocalDiscovery for FsDiscovery {
    async fn discover(&self, paths: &[PathBuf]) -> AcquireResult<Vec<FoundBundle>> {
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || paths.iter().filter_map(|p| Self::scan(p)).collect())
            .await
            .map_err(|e| AcquireError::Extraction {
                message: format!("discovery task failed: {e}"),
            })
    }
}
