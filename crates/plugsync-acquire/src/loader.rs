//! The plugin loading contract.

use std::path::PathBuf;

use async_trait::async_trait;
use plugsync_core::PluginClass;

use crate::error::AcquireResult;
use crate::source::PluginSource;

/// A plugin the loader has brought up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    /// Plugin ID.
    pub id: String,
    /// Loaded version.
    pub version: String,
    /// Class it was loaded as.
    pub class: PluginClass,
    /// Directory it was loaded from.
    pub path: PathBuf,
}

/// Loads plugins from a [`PluginSource`] into the host.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Discover and load everything `source` provides.
    async fn load(&self, source: &dyn PluginSource) -> AcquireResult<Vec<LoadedPlugin>>;

    /// Unload a plugin by ID.
    async fn unload(&self, plugin_id: &str) -> AcquireResult<()>;
}
