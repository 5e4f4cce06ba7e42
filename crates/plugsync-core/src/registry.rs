//! Read-only view of the plugins loaded on this node.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::meta::PluginMeta;
use crate::plugin::PluginClass;

/// A plugin currently loaded on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    /// Metadata of the loaded plugin.
    pub meta: PluginMeta,
    /// Class it was loaded as.
    pub class: PluginClass,
    /// Directory it was loaded from.
    pub path: PathBuf,
}

impl InstalledPlugin {
    /// Plugin identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    /// Loaded version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.meta.version
    }
}

/// Lookup into the node-local plugin registry.
///
/// An empty `version` matches any loaded version of the plugin.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    /// Find a loaded plugin by ID and version.
    async fn plugin(&self, plugin_id: &str, version: &str) -> Option<InstalledPlugin>;

    /// All loaded plugins.
    async fn plugins(&self) -> Vec<InstalledPlugin>;
}
