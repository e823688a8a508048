//! Sync engine facade.
//!
//! The surface exposed to the CRUD/UI layer: gated mutations with offline
//! queueing, attachment resolution, reconciliation, and introspection.
//! Admitted mutations are applied directly to the remote store and mirrored
//! into the fallback cache while online; when connectivity is absent or the
//! direct call fails, they are queued for replay and applied to the cache
//! only.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::FallbackCache;
use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, ReconcileOutcome};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::media::{AttachmentSource, BlobProvider, MediaResolver};
use crate::models::{
    Conflict, Document, MediaObject, OperationKind, PendingOperation,
};
use crate::quota::{QuotaGate, QuotaKind, QuotaUsage};
use crate::remote::{collection_path, DocumentStore};
use crate::store::KvStore;
use crate::sync::{DrainReport, SyncQueue};

/// Result of a gated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Whether the mutation was queued for later replay instead of applied
    /// directly to the remote store.
    pub queued: bool,
}

/// Introspection snapshot for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current connectivity state
    pub online: bool,
    /// Operations awaiting replay
    pub queue_length: usize,
    /// Whether a drain pass is currently running
    pub draining: bool,
}

/// Offline-tolerant, quota-aware sync and media engine.
pub struct SyncEngine {
    remote: Arc<dyn DocumentStore>,
    quota: QuotaGate,
    cache: FallbackCache,
    queue: SyncQueue,
    resolver: ConflictResolver,
    media: MediaResolver,
    connectivity: ConnectivityMonitor,
}

impl SyncEngine {
    /// Build an engine with the blob provider chain read from the
    /// environment.
    #[must_use]
    pub fn new(
        store: Arc<KvStore>,
        remote: Arc<dyn DocumentStore>,
        config: EngineConfig,
        initially_online: bool,
    ) -> Self {
        let media = MediaResolver::from_env(config.compression, config.inline_threshold_bytes);
        Self::with_media_resolver(store, remote, config, initially_online, media)
    }

    /// Build an engine over an explicit blob provider chain.
    #[must_use]
    pub fn with_providers(
        store: Arc<KvStore>,
        remote: Arc<dyn DocumentStore>,
        config: EngineConfig,
        initially_online: bool,
        providers: Vec<Box<dyn BlobProvider>>,
    ) -> Self {
        let media =
            MediaResolver::new(providers, config.compression, config.inline_threshold_bytes);
        Self::with_media_resolver(store, remote, config, initially_online, media)
    }

    fn with_media_resolver(
        store: Arc<KvStore>,
        remote: Arc<dyn DocumentStore>,
        config: EngineConfig,
        initially_online: bool,
        media: MediaResolver,
    ) -> Self {
        Self {
            remote,
            quota: QuotaGate::new(Arc::clone(&store), config.quota),
            cache: FallbackCache::new(Arc::clone(&store)),
            queue: SyncQueue::new(store),
            resolver: ConflictResolver::new(config.conflict_policy),
            media,
            connectivity: ConnectivityMonitor::new(initially_online),
        }
    }

    /// The connectivity monitor, for the platform to report status changes.
    #[must_use]
    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Spawn the drain trigger task: the single subscriber of connectivity
    /// transitions, waking the queue on every offline-to-online edge.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = self.connectivity.subscribe();
        tokio::spawn(async move {
            let mut was_online = *rx.borrow();
            while rx.changed().await.is_ok() {
                let online = *rx.borrow();
                if online && !was_online {
                    tracing::info!("Back online, draining sync queue");
                    engine.drain().await;
                }
                was_online = online;
            }
        })
    }

    /// Apply a gated mutation.
    ///
    /// Quota rejection surfaces [`Error::QuotaExceeded`] before anything is
    /// queued. While online the mutation is applied directly and mirrored
    /// into the cache; offline (or on direct-write failure) it is queued
    /// and applied to the cache only.
    pub async fn perform_mutation(
        &self,
        data_type: &str,
        user_id: &str,
        kind: OperationKind,
        document: Document,
    ) -> Result<MutationOutcome> {
        if !self.quota.can_perform(QuotaKind::Writes, 1) {
            return Err(self.quota_error(QuotaKind::Writes));
        }

        let path = collection_path(data_type, user_id);

        if self.connectivity.is_online() {
            match self.apply_direct(&path, kind, &document).await {
                Ok(()) => {
                    self.quota.record(QuotaKind::Writes, 1);
                    self.apply_to_cache(data_type, user_id, kind, &document)?;
                    return Ok(MutationOutcome { queued: false });
                }
                Err(error) => {
                    tracing::warn!(
                        "Direct {kind} on {path}/{} failed, queueing for replay: {error}",
                        document.id
                    );
                }
            }
        }

        self.enqueue_mutation(&path, kind, &document)?;
        self.apply_to_cache(data_type, user_id, kind, &document)?;

        if self.connectivity.is_online() {
            self.drain().await;
        }

        Ok(MutationOutcome { queued: true })
    }

    /// Read a user's collection, preferring the remote store and falling
    /// back to the local cache when offline, quota-starved, or on failure.
    pub async fn fetch_collection(&self, data_type: &str, user_id: &str) -> Result<Vec<Document>> {
        if self.connectivity.is_online() && self.quota.can_perform(QuotaKind::Reads, 1) {
            let path = collection_path(data_type, user_id);
            match self.remote.query(&path).await {
                Ok(documents) => {
                    self.quota.record(QuotaKind::Reads, 1);
                    self.cache.write(data_type, user_id, &documents)?;
                    return Ok(documents);
                }
                Err(error) => {
                    tracing::warn!("Remote query of {path} failed, serving cache: {error}");
                }
            }
        }

        self.cache.read(data_type, user_id)
    }

    /// Reconcile the cached collection against the remote store under the
    /// configured conflict policy.
    pub async fn reconcile(&self, data_type: &str, user_id: &str) -> Result<ReconcileOutcome> {
        if !self.quota.can_perform(QuotaKind::Reads, 1) {
            return Err(self.quota_error(QuotaKind::Reads));
        }

        let path = collection_path(data_type, user_id);
        let remote_docs = self.remote.query(&path).await?;
        self.quota.record(QuotaKind::Reads, 1);

        self.resolver
            .resolve(data_type, user_id, &self.cache, &self.queue, &remote_docs)
    }

    /// Replay queued operations now. Also triggered by enqueue-while-online
    /// and by offline-to-online transitions.
    pub async fn drain(&self) -> DrainReport {
        self.queue.drain(self.remote.as_ref(), &self.quota).await
    }

    /// Resolve a binary attachment into its storage placement.
    pub async fn resolve_attachment(&self, source: &AttachmentSource) -> Result<MediaObject> {
        self.media.resolve(source).await
    }

    /// Flag inline media objects that outgrew the inline threshold.
    #[must_use]
    pub fn find_oversized_inline(&self, objects: &[MediaObject]) -> Vec<usize> {
        self.media.find_oversized_inline(objects)
    }

    /// Daily quota usage snapshot.
    pub fn usage_stats(&self) -> QuotaUsage {
        self.quota.usage()
    }

    /// Sync introspection snapshot.
    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            online: self.connectivity.is_online(),
            queue_length: self.queue.len(),
            draining: self.queue.is_draining(),
        }
    }

    /// Conflicts awaiting external review under the `Manual` policy.
    pub fn pending_reviews(&self) -> Vec<Conflict> {
        self.resolver.pending_reviews()
    }

    async fn apply_direct(
        &self,
        path: &str,
        kind: OperationKind,
        document: &Document,
    ) -> Result<()> {
        match kind {
            OperationKind::Create => self.remote.set(path, document).await,
            OperationKind::Update => {
                let mut fields = document.fields.clone();
                fields.insert("updatedAt".to_string(), Value::from(document.updated_at));
                self.remote.update(path, &document.id, &fields).await
            }
            OperationKind::Delete => self.remote.delete(path, &document.id).await,
        }
    }

    fn enqueue_mutation(&self, path: &str, kind: OperationKind, document: &Document) -> Result<()> {
        let payload = match kind {
            OperationKind::Create | OperationKind::Update => {
                let mut fields = document.fields.clone();
                fields.insert("updatedAt".to_string(), Value::from(document.updated_at));
                Some(fields)
            }
            OperationKind::Delete => None,
        };
        self.queue.enqueue(PendingOperation::new(
            kind,
            path,
            document.id.clone(),
            payload,
        ))
    }

    /// Mirror a mutation into the cached collection.
    fn apply_to_cache(
        &self,
        data_type: &str,
        user_id: &str,
        kind: OperationKind,
        document: &Document,
    ) -> Result<()> {
        let mut records = self.cache.read(data_type, user_id)?;
        match kind {
            OperationKind::Create | OperationKind::Update => {
                if let Some(existing) = records.iter_mut().find(|r| r.id == document.id) {
                    *existing = document.clone();
                } else {
                    records.push(document.clone());
                }
            }
            OperationKind::Delete => records.retain(|r| r.id != document.id),
        }
        self.cache.write(data_type, user_id, &records)
    }

    fn quota_error(&self, kind: QuotaKind) -> Error {
        Error::QuotaExceeded {
            kind: kind.as_str(),
            used: self.quota.used(kind),
            limit: self.quota.limit(kind),
        }
    }
}
