//! Resolved "latest" versions.

use std::sync::Arc;

use dashmap::DashMap;

/// Concurrent map from a latest-version request to the concrete version it
/// resolved to.
///
/// Keys are the plugin ID, or `{id}:{url}` when a custom URL was used.
/// Cloning shares the underlying map, so a handle can be injected into
/// several components and reset from tests.
#[derive(Debug, Clone, Default)]
pub struct VersionCache {
    inner: Arc<DashMap<String, String>>,
}

impl VersionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a plugin and optional custom URL.
    #[must_use]
    pub fn key(plugin_id: &str, url: Option<&str>) -> String {
        match url {
            Some(url) if !url.is_empty() => format!("{plugin_id}:{url}"),
            _ => plugin_id.to_string(),
        }
    }

    /// Resolved version for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|v| v.value().clone())
    }

    /// Record that `key` resolved to `version`.
    pub fn insert(&self, key: String, version: String) {
        self.inner.insert(key, version);
    }

    /// Forget one resolution.
    pub fn remove(&self, key: &str) {
        self.inner.remove(key);
    }

    /// Forget every resolution.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Number of recorded resolutions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing has been resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_includes_custom_url() {
        assert_eq!(VersionCache::key("p", None), "p");
        assert_eq!(VersionCache::key("p", Some("")), "p");
        assert_eq!(
            VersionCache::key("p", Some("https://x/p.tgz")),
            "p:https://x/p.tgz"
        );
    }

    #[test]
    fn clones_share_state() {
        let a = VersionCache::new();
        let b = a.clone();
        a.insert("p".into(), "1.0.0".into());
        assert_eq!(b.get("p").as_deref(), Some("1.0.0"));
        b.clear();
        assert!(a.is_empty());
    }
}
