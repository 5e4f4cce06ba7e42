//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use plugsync_acquire::{
    AcquisitionContext, CacheInstaller, InstallOptions, MetricsSnapshot, PluginInstaller,
};
use plugsync_config::{Config, PreinstallEntry};
use plugsync_core::{InstallRecord, PluginClass, PluginInstall, PluginMeta, SourceTag};
use plugsync_install::{
    Action, ChildReconciler, InstallRegistrar, MemoryResourceStore, ReconcileEvent, Reconciler,
    Registrar,
};
use plugsync_meta::{MetaProvider, ProviderManager};
use serde::Serialize;
use tracing::{info, warn};

use crate::registry::{NodeRegistry, RegistryLoader};
use crate::wiring;

/// Source tag of records registered from the config file.
const CONFIG_SOURCE: &str = "config";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaOutput<'a> {
    meta: &'a PluginMeta,
    ttl_secs: u64,
}

#[derive(Serialize)]
struct PluginRow {
    id: String,
    version: String,
    class: PluginClass,
    path: PathBuf,
}

#[derive(Serialize)]
struct AcquireOutput {
    plugins: Vec<PluginRow>,
    metrics: MetricsSnapshot,
}

/// Everything a subcommand needs.
pub(crate) struct Runtime {
    pub(crate) config: Config,
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) providers: Arc<ProviderManager>,
    pub(crate) acquisition: AcquisitionContext,
}

impl Runtime {
    fn installer(&self) -> CacheInstaller {
        CacheInstaller::new(
            self.acquisition.clone(),
            Arc::new(RegistryLoader::new(Arc::clone(&self.registry))),
        )
    }
}

fn options(entry: &PreinstallEntry) -> InstallOptions {
    let opts = InstallOptions::default().with_class(PluginClass::External);
    match &entry.url {
        Some(url) => opts.with_url(url.as_str()),
        None => opts,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{out}");
    Ok(())
}

/// Resolve metadata through the provider chain and print it.
pub(crate) async fn meta(rt: &Runtime, plugin_id: &str, version: &str) -> Result<()> {
    let result = rt
        .providers
        .get_meta(plugin_id, version)
        .await
        .with_context(|| format!("no metadata for {plugin_id}"))?;
    print_json(&MetaOutput {
        meta: &result.meta,
        ttl_secs: result.ttl.as_secs(),
    })
}

/// Acquire every `preinstall` entry into the cache and load it.
pub(crate) async fn acquire(rt: &Runtime) -> Result<()> {
    if rt.config.preinstall.is_empty() {
        warn!("no preinstall entries configured");
    }

    let installer = rt.installer();
    let mut failed = 0usize;
    for entry in &rt.config.preinstall {
        if let Err(e) = installer.add(&entry.id, &entry.version, &options(entry)).await {
            warn!(plugin_id = %entry.id, version = %entry.version, error = %e, "acquisition failed");
            failed = failed.saturating_add(1);
        }
    }

    let plugins = rt
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|p| PluginRow {
            id: p.meta.id,
            version: p.meta.version,
            class: p.class,
            path: p.path,
        })
        .collect();
    print_json(&AcquireOutput {
        plugins,
        metrics: rt.acquisition.metrics().snapshot(),
    })?;

    if failed > 0 {
        bail!("{failed} of {} plugins could not be acquired", rt.config.preinstall.len());
    }
    Ok(())
}

/// Register `preinstall` entries as install records and reconcile them on
/// this node, children included.
pub(crate) async fn sync(rt: &Runtime) -> Result<()> {
    let namespace = rt.config.node.namespace.as_str();
    let store = Arc::new(MemoryResourceStore::new());
    let registrar = Arc::new(InstallRegistrar::new(store.clone()));
    let source = SourceTag::Other(CONFIG_SOURCE.to_string());

    for entry in &rt.config.preinstall {
        let mut install =
            PluginInstall::new(entry.id.as_str(), entry.version.as_str(), source.clone());
        install.url.clone_from(&entry.url);
        registrar.register(namespace, &install).await?;
    }

    let children = ChildReconciler::new(registrar, rt.providers.clone())
        .with_requeue(Duration::from_secs(rt.config.reconcile.child_requeue_secs));
    for record in store.list()?.into_iter().filter(|r| !r.spec.has_parent()) {
        let result = children.reconcile(&ReconcileEvent::new(Action::Created, record)).await?;
        if let Some(after) = result.requeue_after {
            warn!(retry_in = ?after, "child registration incomplete");
        }
    }

    let installer: Arc<dyn PluginInstaller> = Arc::new(rt.installer());
    let reconciler =
        wiring::build_reconciler(&rt.config, store.clone(), rt.registry.clone(), installer);

    // Parents first: loading a parent brings its children with it.
    let mut records = store.list()?;
    records.sort_by_key(|r| r.spec.has_parent());

    let mut failed = 0usize;
    for record in records {
        let name = record.metadata.name.clone();
        if let Err(e) = reconciler.reconcile(&ReconcileEvent::new(Action::Created, record)).await {
            warn!(record = %name, error = %e, "reconcile failed");
            failed = failed.saturating_add(1);
        }
    }

    let records: Vec<InstallRecord> = store.list()?;
    info!(records = records.len(), failed, "sync finished");
    print_json(&records)?;

    if failed > 0 {
        bail!("{failed} install records failed to reconcile");
    }
    Ok(())
}
