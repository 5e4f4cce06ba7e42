//! Reconciliation events and results.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use plugsync_core::InstallRecord;

use crate::error::InstallResult;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// The record was created.
    Created,
    /// The record's spec changed.
    Updated,
    /// Periodic re-delivery of an unchanged record.
    Resynced,
    /// The record was deleted.
    Deleted,
}

impl Action {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Resynced => "resynced",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record change delivered by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEvent {
    /// What happened.
    pub action: Action,
    /// The record as of the event.
    pub record: InstallRecord,
}

impl ReconcileEvent {
    /// Create an event.
    #[must_use]
    pub fn new(action: Action, record: InstallRecord) -> Self {
        Self { action, record }
    }
}

/// Outcome of handling one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Deliver the event again after this delay.
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Nothing more to do.
    #[must_use]
    pub fn done() -> Self {
        Self::default()
    }

    /// Try again after `after`.
    #[must_use]
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Handles record events. Owns no loop; a scheduler calls it.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Handle one event.
    ///
    /// An `Err` may still ask for a requeue through
    /// [`InstallError::requeue_after`](crate::InstallError::requeue_after).
    async fn reconcile(&self, event: &ReconcileEvent) -> InstallResult<ReconcileResult>;
}
