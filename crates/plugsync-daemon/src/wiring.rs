//! Turning configuration into running components.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use plugsync_acquire::{AcquisitionContext, FsDiscovery, HttpDownloader, PluginInstaller};
use plugsync_config::Config;
use plugsync_core::PluginRegistry;
use plugsync_install::{InstallReconciler, ResourceClient};
use plugsync_meta::{
    CatalogProvider, CloudProvider, CoreProvider, LocalProvider, MetaProvider, ProviderManager,
};
use tracing::debug;

/// Build the metadata chain in the configured order.
pub(crate) fn build_providers(
    config: &Config,
    registry: Arc<dyn PluginRegistry>,
) -> Result<ProviderManager> {
    let section = &config.providers;
    let mut providers: Vec<Arc<dyn MetaProvider>> = Vec::with_capacity(section.order.len());

    for name in &section.order {
        let provider: Arc<dyn MetaProvider> = match name.as_str() {
            "core" => {
                let dir = section
                    .core_dir
                    .clone()
                    .context("providers.core_dir is required for the core provider")?;
                Arc::new(CoreProvider::new(dir))
            },
            "local" => Arc::new(
                LocalProvider::new(Arc::clone(&registry))
                    .with_ttl(Duration::from_secs(section.local_ttl_secs)),
            ),
            "catalog" => {
                let catalog = &section.catalog;
                Arc::new(
                    CatalogProvider::new(catalog.api_base.as_str())?
                        .with_timeout(Duration::from_secs(catalog.timeout_secs))?
                        .with_ttl(Duration::from_secs(catalog.ttl_secs)),
                )
            },
            "cloud" => {
                let cloud = &section.cloud;
                let api_base = cloud
                    .api_base
                    .as_deref()
                    .context("providers.cloud.api_base is required for the cloud provider")?;
                Arc::new(
                    CloudProvider::new(api_base)?
                        .with_timeout(Duration::from_secs(cloud.timeout_secs))?
                        .with_ttl(Duration::from_secs(cloud.ttl_secs)),
                )
            },
            other => bail!("unknown metadata provider: {other}"),
        };
        debug!(provider = %name, "metadata provider configured");
        providers.push(provider);
    }

    Ok(ProviderManager::new(providers)?)
}

/// Build the acquisition context over the configured cache and artifact server.
pub(crate) fn build_acquisition(config: &Config) -> Result<AcquisitionContext> {
    let downloads = &config.downloads;
    let downloader = HttpDownloader::new(&downloads.base_url)?
        .with_max_size(downloads.max_archive_bytes)
        .with_timeout(Duration::from_secs(downloads.timeout_secs))?;
    let root = config.cache_dir()?;
    debug!(cache = %root.display(), base_url = %downloads.base_url, "acquisition configured");
    Ok(AcquisitionContext::new(
        root,
        Arc::new(downloader),
        Arc::new(FsDiscovery::new()),
    ))
}

/// Build this node's install reconciler.
pub(crate) fn build_reconciler(
    config: &Config,
    client: Arc<dyn ResourceClient>,
    registry: Arc<dyn PluginRegistry>,
    installer: Arc<dyn PluginInstaller>,
) -> InstallReconciler {
    let reconcile = &config.reconcile;
    InstallReconciler::new(config.node.name.as_str(), client, registry, installer)
        .with_timeout(reconcile.timeout())
        .with_status_retries(reconcile.status_retries)
        .with_delete_requeue(Duration::from_secs(reconcile.delete_requeue_secs))
}
