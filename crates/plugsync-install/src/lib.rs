//! Plugsync Install - Install records and their reconciliation.
//!
//! This crate provides:
//! - The [`ResourceClient`] record store contract and an in-memory
//!   [`MemoryResourceStore`]
//! - [`InstallRegistrar`]: source-owned, write-avoiding registration
//! - [`InstallReconciler`]: per-node install/remove with status publishing
//! - [`ChildReconciler`]: one install record per declared child plugin
//!
//! Reconcilers own no event loop. A scheduler feeds them
//! [`ReconcileEvent`]s and honours the returned requeue delays.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod child;
pub mod client;
pub mod error;
pub mod event;
pub mod memory;
pub mod reconciler;
pub mod registrar;

pub use child::{ChildReconciler, DEFAULT_CHILD_REQUEUE};
pub use client::ResourceClient;
pub use error::{ClientError, ClientResult, InstallError, InstallResult};
pub use event::{Action, ReconcileEvent, ReconcileResult, Reconciler};
pub use memory::MemoryResourceStore;
pub use reconciler::{
    DEFAULT_DELETE_REQUEUE, DEFAULT_RECONCILE_TIMEOUT, DEFAULT_STATUS_RETRIES, InstallReconciler,
};
pub use registrar::{InstallRegistrar, Registrar};
