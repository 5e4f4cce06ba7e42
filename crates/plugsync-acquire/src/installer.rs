//! Installing plugins by loading them from the cache.

use std::sync::Arc;

use async_trait::async_trait;
use plugsync_core::{PluginClass, PluginInstall, SourceTag};
use tracing::info;

use crate::error::{AcquireError, AcquireResult};
use crate::loader::Loader;
use crate::source::{AcquisitionContext, AcquisitionSource};

/// Options for [`PluginInstaller::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Custom archive URL.
    pub url: Option<String>,
    /// Class to load the plugin as.
    pub class: PluginClass,
}

impl InstallOptions {
    /// Set a custom archive URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the class.
    #[must_use]
    pub fn with_class(mut self, class: PluginClass) -> Self {
        self.class = class;
        self
    }
}

/// Adds and removes plugins on this node.
#[async_trait]
pub trait PluginInstaller: Send + Sync {
    /// Make `plugin_id` at `version` (empty for latest) available and load it.
    async fn add(&self, plugin_id: &str, version: &str, opts: &InstallOptions) -> AcquireResult<()>;

    /// Unload `plugin_id`.
    async fn remove(&self, plugin_id: &str, version: &str) -> AcquireResult<()>;
}

/// [`PluginInstaller`] that acquires into the local cache and hands the
/// result to a [`Loader`].
#[derive(Clone)]
pub struct CacheInstaller {
    ctx: AcquisitionContext,
    loader: Arc<dyn Loader>,
}

impl std::fmt::Debug for CacheInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInstaller")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl CacheInstaller {
    /// Create an installer.
    #[must_use]
    pub fn new(ctx: AcquisitionContext, loader: Arc<dyn Loader>) -> Self {
        Self { ctx, loader }
    }
}

#[async_trait]
impl PluginInstaller for CacheInstaller {
    async fn add(&self, plugin_id: &str, version: &str, opts: &InstallOptions) -> AcquireResult<()> {
        let mut install = PluginInstall::new(plugin_id, version, SourceTag::Unknown)
            .with_class(opts.class);
        install.url.clone_from(&opts.url);

        let source = AcquisitionSource::new(self.ctx.clone(), vec![install], opts.class);
        let loaded = self.loader.load(&source).await?;
        if loaded.is_empty() {
            return Err(AcquireError::NotLoaded {
                plugin_id: plugin_id.to_string(),
            });
        }
        info!(plugin_id, version, loaded = loaded.len(), "plugin installed");
        Ok(())
    }

    async fn remove(&self, plugin_id: &str, version: &str) -> AcquireResult<()> {
        self.loader.unload(plugin_id).await?;
        info!(plugin_id, version, "plugin removed");
        Ok(())
    }
}
