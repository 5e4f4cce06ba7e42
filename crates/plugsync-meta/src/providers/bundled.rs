use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::{MANIFEST_FILE_NAME, PluginClass, PluginManifest, PluginMeta};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{MetaProvider, MetaResult};

/// Core plugins change only with the host binary, so answers live long.
pub const DEFAULT_CORE_TTL: Duration = Duration::from_secs(86_400);

/// How deep below the core directory manifests are looked for.
const MAX_SCAN_DEPTH: usize = 4;

/// Answers from the core plugins bundled with the host.
///
/// The directory is scanned once, on first use. Core plugins ship with the
/// host, so the requested version is not compared.
pub struct CoreProvider {
    dir: PathBuf,
    ttl: Duration,
    index: RwLock<Option<HashMap<String, PluginMeta>>>,
}

impl CoreProvider {
    /// Create a provider over the bundled plugin directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: DEFAULT_CORE_TTL,
            index: RwLock::new(None),
        }
    }

    /// Override the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn lookup(&self, plugin_id: &str) -> ProviderResult<Option<PluginMeta>> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(index.get(plugin_id).cloned());
        }

        let mut guard = self.index.write().await;
        if guard.is_none() {
            let dir = self.dir.clone();
            let scanned = tokio::task::spawn_blocking(move || scan(&dir))
                .await
                .map_err(|e| ProviderError::Scan {
                    path: self.dir.clone(),
                    message: e.to_string(),
                })??;
            info!(dir = %self.dir.display(), plugins = scanned.len(), "indexed core plugins");
            *guard = Some(scanned);
        }
        Ok(guard.as_ref().and_then(|index| index.get(plugin_id).cloned()))
    }
}

/// Read every manifest below `dir`. Manifests nested inside another
/// plugin's directory become that plugin's children.
fn scan(dir: &Path) -> ProviderResult<HashMap<String, PluginMeta>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "core plugin directory missing");
        return Ok(HashMap::new());
    }

    let mut found: Vec<(PathBuf, PluginMeta)> = Vec::new();
    for entry in WalkDir::new(dir).max_depth(MAX_SCAN_DEPTH).sort_by_file_name() {
        let entry = entry.map_err(|e| ProviderError::Scan {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE_NAME {
            continue;
        }
        match PluginManifest::load(entry.path()) {
            Ok(manifest) => {
                let plugin_dir = entry
                    .path()
                    .parent()
                    .map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
                let meta = PluginMeta::from_manifest(&manifest).with_class(PluginClass::Core);
                found.push((plugin_dir, meta));
            },
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping core manifest");
            },
        }
    }

    link_children(&mut found);

    let mut index = HashMap::with_capacity(found.len());
    for (path, meta) in found {
        if let Some(previous) = index.insert(meta.id.clone(), meta) {
            debug!(
                plugin_id = %previous.id,
                path = %path.display(),
                "duplicate core plugin, last wins"
            );
        }
    }
    Ok(index)
}

/// Set `parent_id`/`children` for manifests whose directory sits inside
/// another plugin's directory. The closest enclosing plugin is the parent.
fn link_children(found: &mut [(PathBuf, PluginMeta)]) {
    let dirs: Vec<(PathBuf, String)> = found
        .iter()
        .map(|(path, meta)| (path.clone(), meta.id.clone()))
        .collect();

    let mut edges: Vec<(usize, String)> = Vec::new();
    for (child_idx, (child_dir, _)) in dirs.iter().enumerate() {
        let parent = dirs
            .iter()
            .filter(|(dir, _)| dir != child_dir && child_dir.starts_with(dir))
            .max_by_key(|(dir, _)| dir.components().count());
        if let Some((_, parent_id)) = parent {
            edges.push((child_idx, parent_id.clone()));
        }
    }

    for (child_idx, parent_id) in edges {
        let Some(child_id) = found.get(child_idx).map(|(_, m)| m.id.clone()) else {
            continue;
        };
        if let Some((_, child)) = found.get_mut(child_idx) {
            child.parent_id = Some(parent_id.clone());
        }
        if let Some((_, parent)) = found.iter_mut().find(|(_, m)| m.id == parent_id) {
            parent.children.push(child_id);
        }
    }
}

#[async_trait]
impl MetaProvider for CoreProvider {
    fn name(&self) -> &'static str {
        "core"
    }

    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult> {
        self.lookup(plugin_id)
            .await?
            .map(|meta| MetaResult::new(meta, self.ttl))
            .ok_or_else(|| ProviderError::not_found(plugin_id, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, id: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        PluginManifest::new(id, version).write_to_dir(dir).unwrap();
    }

    #[tokio::test]
    async fn ignores_requested_version() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("table"), "table", "11.0.0");

        let provider = CoreProvider::new(tmp.path());
        let result = provider.get_meta("table", "1.2.3").await.unwrap();
        assert_eq!(result.meta.version, "11.0.0");
        assert_eq!(result.meta.class, Some(PluginClass::Core));
    }

    #[tokio::test]
    async fn scans_once() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("table"), "table", "11.0.0");
        let provider = CoreProvider::new(tmp.path());
        provider.get_meta("table", "").await.unwrap();

        write(&tmp.path().join("late"), "late", "1.0.0");
        assert!(provider.get_meta("late", "").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn nested_manifests_become_children() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("app"), "app", "1.0.0");
        write(&tmp.path().join("app").join("datasource"), "app-ds", "1.0.0");
        std::fs::create_dir_all(tmp.path().join("broken")).unwrap();
        std::fs::write(tmp.path().join("broken").join(MANIFEST_FILE_NAME), "{").unwrap();

        let provider = CoreProvider::new(tmp.path());
        let app = provider.get_meta("app", "").await.unwrap().meta;
        assert_eq!(app.children, vec!["app-ds".to_string()]);
        let ds = provider.get_meta("app-ds", "").await.unwrap().meta;
        assert_eq!(ds.parent_id.as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn missing_dir_is_empty() {
        let provider = CoreProvider::new("/nonexistent/core-plugins");
        assert!(provider.get_meta("table", "").await.unwrap_err().is_not_found());
    }
}
