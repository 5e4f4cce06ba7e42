//! In-memory record store.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use plugsync_core::{InstallRecord, ResourceKey};

use crate::client::ResourceClient;
use crate::error::{ClientError, ClientResult};

/// [`ResourceClient`] backed by a `HashMap`, for tests and single-node use.
///
/// Resource versions come from one counter and only ever increase.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    records: RwLock<HashMap<ResourceKey, InstallRecord>>,
    version: AtomicU64,
}

impl MemoryResourceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Backend`] if the store lock is poisoned.
    pub fn list(&self) -> ClientResult<Vec<InstallRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| ClientError::Backend(e.to_string()))?;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by_key(InstallRecord::key);
        Ok(all)
    }

    fn next_version(&self) -> String {
        self.version
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
            .to_string()
    }

    /// Apply `merge` to the stored record if `incoming` carries its current
    /// resource version.
    fn swap(
        &self,
        incoming: InstallRecord,
        merge: impl FnOnce(InstallRecord, InstallRecord) -> InstallRecord,
    ) -> ClientResult<InstallRecord> {
        let key = incoming.key();
        let mut records = self
            .records
            .write()
            .map_err(|e| ClientError::Backend(e.to_string()))?;
        let Some(current) = records.get(&key) else {
            return Err(ClientError::NotFound { key });
        };
        if current.metadata.resource_version != incoming.metadata.resource_version {
            return Err(ClientError::Conflict {
                expected: incoming.metadata.resource_version,
                actual: current.metadata.resource_version.clone(),
                key,
            });
        }

        let mut next = merge(current.clone(), incoming);
        next.metadata.resource_version = self.next_version();
        records.insert(key, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl ResourceClient for MemoryResourceStore {
    async fn get(&self, key: &ResourceKey) -> ClientResult<InstallRecord> {
        let records = self
            .records
            .read()
            .map_err(|e| ClientError::Backend(e.to_string()))?;
        records
            .get(key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound { key: key.clone() })
    }

    async fn create(&self, mut record: InstallRecord) -> ClientResult<InstallRecord> {
        let key = record.key();
        let mut records = self
            .records
            .write()
            .map_err(|e| ClientError::Backend(e.to_string()))?;
        if records.contains_key(&key) {
            return Err(ClientError::AlreadyExists { key });
        }
        record.metadata.resource_version = self.next_version();
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn update(&self, record: InstallRecord) -> ClientResult<InstallRecord> {
        self.swap(record, |current, mut incoming| {
            incoming.status = current.status;
            incoming
        })
    }

    async fn update_status(&self, record: InstallRecord) -> ClientResult<InstallRecord> {
        self.swap(record, |mut current, incoming| {
            current.status = incoming.status;
            current
        })
    }

    async fn delete(&self, key: &ResourceKey) -> ClientResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|e| ClientError::Backend(e.to_string()))?;
        records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound { key: key.clone() })
    }
}
