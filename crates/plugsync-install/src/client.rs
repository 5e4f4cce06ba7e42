//! The install record store contract.

use async_trait::async_trait;
use plugsync_core::{InstallRecord, ResourceKey};

use crate::error::ClientResult;

/// Versioned store of [`InstallRecord`]s.
///
/// Writes are compare-and-swap on `metadata.resource_version`: a write
/// carrying a stale version fails with
/// [`ClientError::Conflict`](crate::ClientError::Conflict).
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Read a record.
    async fn get(&self, key: &ResourceKey) -> ClientResult<InstallRecord>;

    /// Store a new record. Its resource version is assigned by the store.
    async fn create(&self, record: InstallRecord) -> ClientResult<InstallRecord>;

    /// Replace a record's metadata and spec. The stored status is kept.
    async fn update(&self, record: InstallRecord) -> ClientResult<InstallRecord>;

    /// Replace a record's status. The stored spec is kept.
    async fn update_status(&self, record: InstallRecord) -> ClientResult<InstallRecord>;

    /// Remove a record.
    async fn delete(&self, key: &ResourceKey) -> ClientResult<()>;
}
