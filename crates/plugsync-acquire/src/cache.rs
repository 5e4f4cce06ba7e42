//! The on-disk plugin cache.
//!
//! Layout: `{root}/{id}-{version}` (preferred) or `{root}/{id}` (legacy),
//! each holding a `plugin.json`.

use std::path::{Path, PathBuf};

use plugsync_core::{PluginManifest, PluginRef};
use tracing::{debug, trace};

/// Read-only view of the plugin cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `root`. The directory need not exist yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{id}-{version}`.
    #[must_use]
    pub fn versioned_dir(&self, plugin_id: &str, version: &str) -> PathBuf {
        self.root
            .join(PluginRef::new(plugin_id, version).dir_name())
    }

    /// `{root}/{id}`.
    #[must_use]
    pub fn legacy_dir(&self, plugin_id: &str) -> PathBuf {
        self.root.join(plugin_id)
    }

    /// Find a cached copy of `plugin_id` at exactly `version`.
    ///
    /// The versioned directory is preferred over the legacy one. A candidate
    /// only counts if its manifest declares the requested ID and version.
    #[must_use]
    pub fn check(&self, plugin_id: &str, version: &str) -> Option<PathBuf> {
        if plugin_id.is_empty() || version.is_empty() {
            return None;
        }
        [self.versioned_dir(plugin_id, version), self.legacy_dir(plugin_id)]
            .into_iter()
            .find(|dir| Self::holds(dir, plugin_id, version))
    }

    /// Whether `dir` holds a manifest for `plugin_id` at `version`.
    #[must_use]
    pub fn holds(dir: &Path, plugin_id: &str, version: &str) -> bool {
        match PluginManifest::load_from_dir(dir) {
            Ok(manifest) if manifest.matches(plugin_id, version) => {
                debug!(plugin_id, version, dir = %dir.display(), "cache hit");
                true
            },
            Ok(manifest) => {
                debug!(
                    plugin_id,
                    version,
                    dir = %dir.display(),
                    found_id = %manifest.id,
                    found_version = %manifest.version(),
                    "cached manifest does not match"
                );
                false
            },
            Err(e) => {
                trace!(dir = %dir.display(), error = %e, "no usable cached manifest");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, id: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        PluginManifest::new(id, version).write_to_dir(dir).unwrap();
    }

    #[test]
    fn versioned_dir_is_preferred() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        write(&store.versioned_dir("p", "1.0.0"), "p", "1.0.0");
        write(&store.legacy_dir("p"), "p", "1.0.0");

        assert_eq!(store.check("p", "1.0.0"), Some(tmp.path().join("p-1.0.0")));
    }

    #[test]
    fn legacy_dir_is_used_when_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        write(&store.legacy_dir("p"), "p", "1.0.0");

        assert_eq!(store.check("p", "1.0.0"), Some(tmp.path().join("p")));
        assert_eq!(store.check("p", "2.0.0"), None);
    }

    #[test]
    fn mismatched_manifest_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        write(&store.versioned_dir("p", "1.0.0"), "p", "0.9.0");
        write(&store.legacy_dir("p"), "other", "1.0.0");

        assert_eq!(store.check("p", "1.0.0"), None);
    }

    #[test]
    fn missing_or_degenerate_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        assert_eq!(store.check("p", "1.0.0"), None);
        assert_eq!(store.check("", ""), None);
        assert_eq!(store.check("p", ""), None);
    }
}
