//! Record storage contract and an in-memory implementation.
//!
//! Stores are the source of truth for desired state and persisted status.
//! Updates use optimistic concurrency on `resource_version`; deletion is a
//! request that finalizers can hold open.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tether_core::{Error, ObjectKey, Record, Result};
use tokio::sync::RwLock;
use tracing::debug;

use crate::dependency::{DependencyLookup, DependencyRecord};

#[async_trait]
pub trait RecordStore<S, P>: Send + Sync {
    /// Fetch a record. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailed` if the backend cannot be read.
    async fn get(&self, key: &ObjectKey) -> Result<Option<Record<S, P>>>;

    /// Write a record whose `resource_version` matches the stored one.
    /// Returns the stored record with its new version. A record with a
    /// deletion request and no finalizers left is removed instead.
    ///
    /// # Errors
    ///
    /// `Conflict` on a version mismatch, `RecordNotFound` if the record is
    /// gone, `StoreFailed` for backend failures.
    async fn update(&self, record: Record<S, P>) -> Result<Record<S, P>>;

    /// Request deletion. Records with finalizers are stamped with a
    /// deletion timestamp; records without are removed.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if the record does not exist.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
}

/// Store backed by a `HashMap`, for tests and embedding.
#[derive(Debug)]
pub struct InMemoryRecordStore<S, P> {
    records: Arc<RwLock<HashMap<ObjectKey, Record<S, P>>>>,
}

impl<S, P> Clone for InMemoryRecordStore<S, P> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<S, P> Default for InMemoryRecordStore<S, P> {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<S, P> InMemoryRecordStore<S, P>
where
    S: Clone + Send + Sync,
    P: Clone + Send + Sync,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record at version 1.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailed` if a record with the same key exists.
    pub async fn create(&self, mut record: Record<S, P>) -> Result<Record<S, P>> {
        let mut records = self.records.write().await;
        if records.contains_key(record.key()) {
            return Err(Error::store_failed(
                "create",
                format!("record '{}' already exists", record.key()),
            ));
        }
        record.meta.resource_version = 1;
        records.insert(record.key().clone(), record.clone());
        debug!(key = %record.key(), kind = record.kind(), "Record created");
        Ok(record)
    }

    pub async fn contains(&self, key: &ObjectKey) -> bool {
        self.records.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All stored records, in no particular order.
    pub async fn list(&self) -> Vec<Record<S, P>> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl<S, P> RecordStore<S, P> for InMemoryRecordStore<S, P>
where
    S: Clone + Send + Sync,
    P: Clone + Send + Sync,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<Record<S, P>>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn update(&self, mut record: Record<S, P>) -> Result<Record<S, P>> {
        let mut records = self.records.write().await;
        let key = record.key().clone();
        let stored = records
            .get(&key)
            .ok_or_else(|| Error::record_not_found(key.to_string()))?;

        let expected = record.meta.resource_version;
        let actual = stored.meta.resource_version;
        if expected != actual {
            return Err(Error::conflict(key.to_string(), expected, actual));
        }
        // A deletion request cannot be withdrawn by an update.
        if record.meta.deletion_timestamp.is_none() {
            record.meta.deletion_timestamp = stored.meta.deletion_timestamp;
        }

        record.meta.resource_version = actual.saturating_add(1);

        if record.is_deletion_requested() && record.meta.finalizers.is_empty() {
            records.remove(&key);
            debug!(key = %key, "Last finalizer removed, record deleted");
        } else {
            records.insert(key, record.clone());
        }
        Ok(record)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut records = self.records.write().await;
        let finalizers_pending = records
            .get(key)
            .map(|r| !r.meta.finalizers.is_empty())
            .ok_or_else(|| Error::record_not_found(key.to_string()))?;

        if finalizers_pending {
            if let Some(record) = records.get_mut(key) {
                if record.meta.deletion_timestamp.is_none() {
                    record.meta.deletion_timestamp = Some(Utc::now());
                    record.meta.resource_version = record.meta.resource_version.saturating_add(1);
                }
            }
            debug!(key = %key, "Deletion requested, waiting on finalizers");
        } else {
            records.remove(key);
            debug!(key = %key, "Record deleted");
        }
        Ok(())
    }
}

#[async_trait]
impl<S, P> DependencyLookup for InMemoryRecordStore<S, P>
where
    S: Clone + Send + Sync,
    P: Clone + Serialize + Send + Sync,
{
    async fn lookup(&self, key: &ObjectKey) -> Result<Option<DependencyRecord>> {
        self.records
            .read()
            .await
            .get(key)
            .map(DependencyRecord::from_record)
            .transpose()
    }
}
