//! Driving this node towards the declared install records.
//!
//! Per record and node the phase moves `Pending -> Installing -> Ready` or
//! `Failed`, and is re-evaluated on every event. Status writes are
//! best-effort: a lost compare-and-swap race is retried a few times and
//! then dropped with a warning, because the next event will write again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_acquire::{InstallOptions, PluginInstaller};
use plugsync_core::{
    InstallRecord, InstallSpec, InstalledPlugin, NodePhase, NodeStatus, PluginRegistry,
    ResourceKey, SourceType,
};
use plugsync_telemetry::OperationContext;
use tracing::{Instrument, debug, info, warn};

use crate::client::ResourceClient;
use crate::error::{InstallError, InstallResult};
use crate::event::{Action, ReconcileEvent, ReconcileResult, Reconciler};

/// Deadline for handling one event.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(300);

/// Attempts at a status write before giving up.
pub const DEFAULT_STATUS_RETRIES: u32 = 3;

/// Requeue delay after a failed removal.
pub const DEFAULT_DELETE_REQUEUE: Duration = Duration::from_secs(30);

/// Installs and removes plugins on one node to match install records.
#[derive(Clone)]
pub struct InstallReconciler {
    node: String,
    client: Arc<dyn ResourceClient>,
    registry: Arc<dyn PluginRegistry>,
    installer: Arc<dyn PluginInstaller>,
    timeout: Duration,
    status_retries: u32,
    delete_requeue: Duration,
}

impl std::fmt::Debug for InstallReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallReconciler")
            .field("node", &self.node)
            .field("timeout", &self.timeout)
            .field("status_retries", &self.status_retries)
            .finish_non_exhaustive()
    }
}

impl InstallReconciler {
    /// Create a reconciler for the node `node`.
    #[must_use]
    pub fn new(
        node: impl Into<String>,
        client: Arc<dyn ResourceClient>,
        registry: Arc<dyn PluginRegistry>,
        installer: Arc<dyn PluginInstaller>,
    ) -> Self {
        Self {
            node: node.into(),
            client,
            registry,
            installer,
            timeout: DEFAULT_RECONCILE_TIMEOUT,
            status_retries: DEFAULT_STATUS_RETRIES,
            delete_requeue: DEFAULT_DELETE_REQUEUE,
        }
    }

    /// Set the per-event deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many times a status write is attempted.
    #[must_use]
    pub fn with_status_retries(mut self, retries: u32) -> Self {
        self.status_retries = retries;
        self
    }

    /// Set the requeue delay after a failed removal.
    #[must_use]
    pub fn with_delete_requeue(mut self, delay: Duration) -> Self {
        self.delete_requeue = delay;
        self
    }

    /// Name of the node this reconciler acts for.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    async fn handle(&self, event: &ReconcileEvent) -> InstallResult<ReconcileResult> {
        match event.action {
            Action::Deleted => self.remove(&event.record).await,
            Action::Created | Action::Updated | Action::Resynced => {
                self.apply(&event.record).await
            },
        }
    }

    async fn apply(&self, record: &InstallRecord) -> InstallResult<ReconcileResult> {
        let spec = &record.spec;
        let key = record.key();

        if let Some(installed) = self.registry.plugin(&spec.id, &spec.version).await {
            debug!(version = %installed.version(), "already installed");
            self.publish(&key, self.ready(&installed)).await;
            return Ok(ReconcileResult::done());
        }

        self.publish(&key, NodeStatus::new(self.node.clone(), NodePhase::Installing))
            .await;
        match self.install(spec).await {
            Ok(installed) => {
                info!(version = %installed.version(), "plugin installed");
                self.publish(&key, self.ready(&installed)).await;
                Ok(ReconcileResult::done())
            },
            Err(e) => {
                warn!(error = %e, "install failed");
                self.publish(&key, self.failed(&e)).await;
                Err(e)
            },
        }
    }

    async fn install(&self, spec: &InstallSpec) -> InstallResult<InstalledPlugin> {
        let source_type =
            spec.source_type()
                .map_err(|source| InstallError::UnknownSourceType {
                    plugin_id: spec.id.clone(),
                    source,
                })?;

        let opts = InstallOptions::default().with_class(spec.class);
        let opts = match source_type {
            SourceType::Catalog => opts,
            SourceType::Url => {
                let url = spec
                    .url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| InstallError::MissingOption {
                        plugin_id: spec.id.clone(),
                        source_type: SourceType::Url.as_str(),
                        option: "url",
                    })?;
                opts.with_url(url)
            },
            SourceType::Cdn => {
                return Err(InstallError::UnsupportedSource {
                    plugin_id: spec.id.clone(),
                    source_type: SourceType::Cdn.as_str(),
                });
            },
        };

        self.installer.add(&spec.id, &spec.version, &opts).await?;

        self.registry
            .plugin(&spec.id, &spec.version)
            .await
            .ok_or_else(|| InstallError::NotRegistered {
                plugin_id: spec.id.clone(),
                version: spec.version.clone(),
            })
    }

    async fn remove(&self, record: &InstallRecord) -> InstallResult<ReconcileResult> {
        let spec = &record.spec;
        if self.registry.plugin(&spec.id, "").await.is_none() {
            debug!("not installed, nothing to remove");
            return Ok(ReconcileResult::done());
        }

        match self.installer.remove(&spec.id, &spec.version).await {
            Ok(()) => {
                info!("plugin removed");
                Ok(ReconcileResult::done())
            },
            Err(source) => {
                warn!(error = %source, "remove failed");
                Err(InstallError::Remove {
                    plugin_id: spec.id.clone(),
                    requeue_after: self.delete_requeue,
                    source,
                })
            },
        }
    }

    fn ready(&self, installed: &InstalledPlugin) -> NodeStatus {
        NodeStatus::new(self.node.clone(), NodePhase::Ready)
            .with_version(installed.version())
            .with_class(installed.class)
    }

    fn failed(&self, error: &InstallError) -> NodeStatus {
        NodeStatus::new(self.node.clone(), NodePhase::Failed).with_message(error.to_string())
    }

    /// Write this node's entry into the record status.
    ///
    /// Each attempt re-reads the record so the entry is applied on top of
    /// the latest node map and the aggregate is recomputed from it.
    async fn publish(&self, key: &ResourceKey, entry: NodeStatus) {
        let phase = entry.phase;
        for attempt in 1..=self.status_retries {
            let mut record = match self.client.get(key).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = %key, phase = %phase, error = %e, "cannot read record for status write");
                    return;
                },
            };
            record.status.set_node(entry.clone());

            match self.client.update_status(record).await {
                Ok(_) => {
                    debug!(key = %key, phase = %phase, attempt, "status written");
                    return;
                },
                Err(e) if e.is_conflict() => {
                    debug!(key = %key, attempt, "status write conflicted, retrying");
                },
                Err(e) => {
                    warn!(key = %key, phase = %phase, error = %e, "status write failed");
                    return;
                },
            }
        }
        warn!(
            key = %key,
            phase = %phase,
            attempts = self.status_retries,
            "giving up on status write after repeated conflicts"
        );
    }
}

#[async_trait]
impl Reconciler for InstallReconciler {
    fn name(&self) -> &'static str {
        "install-reconciler"
    }

    async fn reconcile(&self, event: &ReconcileEvent) -> InstallResult<ReconcileResult> {
        let ctx = OperationContext::new(self.name(), event.action.as_str())
            .with_plugin(event.record.spec.id.clone())
            .with_node(self.node.clone());
        let span = ctx.span();

        let outcome = tokio::time::timeout(self.timeout, self.handle(event))
            .instrument(span.clone())
            .await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                let err = InstallError::Timeout {
                    plugin_id: event.record.spec.id.clone(),
                    timeout: self.timeout,
                };
                async {
                    warn!(elapsed_ms = ctx.elapsed_ms(), "reconcile deadline exceeded");
                    if event.action != Action::Deleted {
                        self.publish(&event.record.key(), self.failed(&err)).await;
                    }
                }
                .instrument(span)
                .await;
                Err(err)
            },
        }
    }
}
