//! The daemon's view of which plugins are loaded on this node.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use plugsync_acquire::{
    AcquireError, AcquireResult, FoundBundle, FoundPlugin, FsDiscovery, LoadedPlugin, Loader,
    LocalDiscovery, PluginSource, TEMP_DIR_PREFIX,
};
use plugsync_core::{InstalledPlugin, PluginClass, PluginMeta, PluginRegistry};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Loaded plugins keyed by ID. A plugin is loaded at most once.
#[derive(Debug, Default)]
pub(crate) struct NodeRegistry {
    plugins: RwLock<BTreeMap<String, InstalledPlugin>>,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, plugin: InstalledPlugin) {
        let mut plugins = self.plugins.write().await;
        if let Some(previous) = plugins.insert(plugin.id().to_string(), plugin) {
            debug!(plugin_id = %previous.id(), replaced = %previous.version(), "replaced loaded plugin");
        }
    }

    /// Register a bundle and its children. Returns what was registered.
    async fn insert_bundle(&self, bundle: FoundBundle, class: PluginClass) -> Vec<LoadedPlugin> {
        let parent = bundle.id().to_string();
        let mut loaded = Vec::with_capacity(bundle.children.len().saturating_add(1));
        loaded.push(self.insert_found(bundle.primary, class, None).await);
        for child in bundle.children {
            loaded.push(self.insert_found(child, class, Some(&parent)).await);
        }
        loaded
    }

    async fn insert_found(
        &self,
        found: FoundPlugin,
        class: PluginClass,
        parent: Option<&str>,
    ) -> LoadedPlugin {
        let mut meta = PluginMeta::from_manifest(&found.manifest).with_class(class);
        if let Some(parent) = parent {
            meta = meta.with_parent(parent);
        }
        let loaded = LoadedPlugin {
            id: meta.id.clone(),
            version: meta.version.clone(),
            class,
            path: found.dir.clone(),
        };
        self.insert(InstalledPlugin {
            meta,
            class,
            path: found.dir,
        })
        .await;
        loaded
    }

    async fn remove(&self, plugin_id: &str) -> bool {
        self.plugins.write().await.remove(plugin_id).is_some()
    }

    /// Treat every plugin already in the cache at `root` as loaded.
    pub(crate) async fn scan_cache(&self, root: &Path) -> AcquireResult<usize> {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(root, e)),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(root, e))?
        {
            let hidden = entry.file_name().to_string_lossy().starts_with(TEMP_DIR_PREFIX);
            if !hidden && entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut count = 0usize;
        for bundle in FsDiscovery::new().discover(&paths).await? {
            let loaded = self.insert_bundle(bundle, PluginClass::External).await;
            count = count.saturating_add(loaded.len());
        }
        info!(dir = %root.display(), plugins = count, "indexed cached plugins");
        Ok(count)
    }

    /// Every loaded plugin, ordered by ID.
    pub(crate) async fn snapshot(&self) -> Vec<InstalledPlugin> {
        self.plugins.read().await.values().cloned().collect()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> AcquireError {
    AcquireError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl PluginRegistry for NodeRegistry {
    async fn plugin(&self, plugin_id: &str, version: &str) -> Option<InstalledPlugin> {
        self.plugins
            .read()
            .await
            .get(plugin_id)
            .filter(|p| version.is_empty() || p.version() == version)
            .cloned()
    }

    async fn plugins(&self) -> Vec<InstalledPlugin> {
        self.snapshot().await
    }
}

/// [`Loader`] that registers discovered bundles in a [`NodeRegistry`].
#[derive(Debug, Clone)]
pub(crate) struct RegistryLoader {
    registry: Arc<NodeRegistry>,
}

impl RegistryLoader {
    pub(crate) fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Loader for RegistryLoader {
    async fn load(&self, source: &dyn PluginSource) -> AcquireResult<Vec<LoadedPlugin>> {
        let class = source.class();
        let mut loaded = Vec::new();
        for bundle in source.discover().await? {
            loaded.extend(self.registry.insert_bundle(bundle, class).await);
        }
        Ok(loaded)
    }

    async fn unload(&self, plugin_id: &str) -> AcquireResult<()> {
        if !self.registry.remove(plugin_id).await {
            debug!(plugin_id, "plugin was not loaded");
        }
        Ok(())
    }
}
