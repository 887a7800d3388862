//! Shared handle to a [`ReplicatedCache`] for async hosts.
//!
//! The transport callback and the presentation layer typically live on
//! different tasks. [`SharedReplica`] wraps the cache in an
//! `Arc<RwLock<_>>`: ingestion and local recording take the write lock, so a
//! batch is applied as a whole before any reader sees it; snapshots take the
//! read lock and may run concurrently.

use crate::cache::{CacheDump, CacheError, IngestReport, LocalEvent, RecordError, ReplicatedCache};
use crate::envelope::EnvelopeError;
use crate::types::{OrderEvent, OrderState};
use order_mesh_core::identity::OrderId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cloneable, thread-safe handle to one replica.
#[derive(Clone, Debug)]
pub struct SharedReplica {
    cache: Arc<RwLock<ReplicatedCache>>,
}

impl SharedReplica {
    /// Wrap a cache.
    #[must_use]
    pub fn new(cache: ReplicatedCache) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    /// See [`ReplicatedCache::ingest`].
    pub async fn ingest<I, B>(&self, batch: I) -> IngestReport
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.cache.write().await.ingest(batch)
    }

    /// See [`ReplicatedCache::ingest_message`].
    ///
    /// # Errors
    ///
    /// Returns an error if the outer batch message is malformed.
    pub async fn ingest_message(&self, message: &str) -> Result<IngestReport, EnvelopeError> {
        self.cache.write().await.ingest_message(message)
    }

    /// See [`ReplicatedCache::record_local_events`].
    ///
    /// # Errors
    ///
    /// See [`RecordError`].
    pub async fn record_local_events(
        &self,
        order_id: &OrderId,
        events: Vec<LocalEvent>,
    ) -> Result<Vec<u8>, RecordError> {
        self.cache
            .write()
            .await
            .record_local_events(order_id, events)
    }

    /// See [`ReplicatedCache::snapshot_all`].
    pub async fn snapshot_all(&self) -> BTreeMap<OrderId, OrderState> {
        self.cache.read().await.snapshot_all()
    }

    /// See [`ReplicatedCache::snapshot`].
    ///
    /// # Errors
    ///
    /// See [`CacheError`].
    pub async fn snapshot(&self, order_id: &OrderId) -> Result<OrderState, CacheError> {
        self.cache.read().await.snapshot(order_id)
    }

    /// See [`ReplicatedCache::last_event`].
    pub async fn last_event(&self, order_id: &OrderId) -> Option<OrderEvent> {
        self.cache.read().await.last_event(order_id)
    }

    /// See [`ReplicatedCache::inspect`].
    pub async fn inspect(&self) -> CacheDump {
        self.cache.read().await.inspect()
    }

    /// See [`ReplicatedCache::sync_envelopes`].
    pub async fn sync_envelopes(&self) -> Vec<Vec<u8>> {
        self.cache.read().await.sync_envelopes()
    }

    /// Run `f` against the cache under the read lock.
    pub async fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ReplicatedCache) -> T,
    {
        let cache = self.cache.read().await;
        f(&cache)
    }
}
