//! Registering the child plugins a bundle declares.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::{InstallRecord, PluginInstall, SourceTag};
use plugsync_meta::MetaProvider;
use plugsync_telemetry::OperationContext;
use tracing::{Instrument, debug, info, warn};

use crate::error::{InstallError, InstallResult};
use crate::event::{Action, ReconcileEvent, ReconcileResult, Reconciler};
use crate::registrar::Registrar;

/// Requeue delay after any child failed.
pub const DEFAULT_CHILD_REQUEUE: Duration = Duration::from_secs(10);

/// Keeps one install record per declared child of a top-level plugin.
///
/// Child failures never surface as errors; they turn into a requeue so the
/// scheduler's backoff handles them.
#[derive(Clone)]
pub struct ChildReconciler {
    registrar: Arc<dyn Registrar>,
    meta: Arc<dyn MetaProvider>,
    requeue: Duration,
}

impl std::fmt::Debug for ChildReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildReconciler")
            .field("meta", &self.meta.name())
            .field("requeue", &self.requeue)
            .finish_non_exhaustive()
    }
}

impl ChildReconciler {
    /// Create a child reconciler.
    #[must_use]
    pub fn new(registrar: Arc<dyn Registrar>, meta: Arc<dyn MetaProvider>) -> Self {
        Self {
            registrar,
            meta,
            requeue: DEFAULT_CHILD_REQUEUE,
        }
    }

    /// Set the requeue delay.
    #[must_use]
    pub fn with_requeue(mut self, delay: Duration) -> Self {
        self.requeue = delay;
        self
    }

    async fn register_children(&self, parent: &InstallRecord, children: &[String]) -> usize {
        let namespace = &parent.metadata.namespace;
        let mut failed = 0usize;
        for child in children {
            let install = PluginInstall::new(
                child.clone(),
                parent.spec.version.clone(),
                SourceTag::ChildReconciler,
            )
            .with_parent(parent.spec.id.clone());

            if let Err(e) = self.registrar.register(namespace, &install).await {
                warn!(child = %child, error = %e, "failed to register child");
                failed = failed.saturating_add(1);
            }
        }
        failed
    }

    async fn unregister_children(&self, parent: &InstallRecord, children: &[String]) -> usize {
        let namespace = &parent.metadata.namespace;
        let mut failed = 0usize;
        for child in children {
            match self
                .registrar
                .unregister(namespace, child, &SourceTag::ChildReconciler)
                .await
            {
                Ok(()) => {},
                Err(InstallError::Client(e)) if e.is_not_found() => {
                    debug!(child = %child, "child already gone");
                },
                Err(e) => {
                    warn!(child = %child, error = %e, "failed to unregister child");
                    failed = failed.saturating_add(1);
                },
            }
        }
        failed
    }

    async fn handle(&self, event: &ReconcileEvent) -> ReconcileResult {
        let spec = &event.record.spec;
        let meta = match self.meta.get_meta(&spec.id, &spec.version).await {
            Ok(result) => result.meta,
            Err(e) => {
                warn!(error = %e, "parent metadata unavailable, requeueing");
                return ReconcileResult::requeue(self.requeue);
            },
        };
        if meta.children.is_empty() {
            return ReconcileResult::done();
        }

        let failed = match event.action {
            Action::Deleted => self.unregister_children(&event.record, &meta.children).await,
            Action::Created | Action::Updated | Action::Resynced => {
                self.register_children(&event.record, &meta.children).await
            },
        };

        if failed > 0 {
            warn!(failed, total = meta.children.len(), "some children failed, requeueing");
            ReconcileResult::requeue(self.requeue)
        } else {
            info!(children = meta.children.len(), action = %event.action, "children reconciled");
            ReconcileResult::done()
        }
    }
}

#[async_trait]
impl Reconciler for ChildReconciler {
    fn name(&self) -> &'static str {
        "child-reconciler"
    }

    async fn reconcile(&self, event: &ReconcileEvent) -> InstallResult<ReconcileResult> {
        if event.record.spec.has_parent() {
            debug!(plugin_id = %event.record.spec.id, "record is a child itself, skipping");
            return Ok(ReconcileResult::done());
        }

        let ctx = OperationContext::new(self.name(), event.action.as_str())
            .with_plugin(event.record.spec.id.clone());
        Ok(self.handle(event).instrument(ctx.span()).await)
    }
}
