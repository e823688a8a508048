//! Sync queue and batch committer.
//!
//! An ordered, persisted log of pending create/update/delete operations,
//! replayed against the remote store as atomically-committed batches with
//! bounded per-operation retry. Operations enter the queue when a mutation
//! is attempted while disconnected or a direct write fails; they leave it
//! when committed or when their retry budget is exhausted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Document, OperationId, OperationKind, PendingOperation};
use crate::quota::{QuotaGate, QuotaKind};
use crate::remote::{BatchWrite, DocumentStore};
use crate::store::KvStore;

const QUEUE_KEY: &str = "sync/queue";

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations committed and removed from the queue
    pub committed: usize,
    /// Operations that failed staging or commit and remain queued
    pub retried: usize,
    /// Operations dropped after exhausting their retry budget
    pub dropped: usize,
    /// Operations left untouched because write quota ran out mid-pass
    pub deferred: usize,
}

/// Persisted FIFO queue of pending operations.
pub struct SyncQueue {
    store: Arc<KvStore>,
    ops: Mutex<Vec<PendingOperation>>,
    drain_gate: tokio::sync::Mutex<()>,
    draining: AtomicBool,
}

impl SyncQueue {
    /// Build a queue, restoring persisted operations from the store.
    pub fn new(store: Arc<KvStore>) -> Self {
        let ops = match store.get_json::<Vec<PendingOperation>>(QUEUE_KEY) {
            Ok(Some(ops)) => ops,
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::warn!("Failed to restore sync queue, starting empty: {error}");
                Vec::new()
            }
        };

        Self {
            store,
            ops: Mutex::new(ops),
            drain_gate: tokio::sync::Mutex::new(()),
            draining: AtomicBool::new(false),
        }
    }

    /// Append an operation to the queue and persist immediately.
    pub fn enqueue(&self, operation: PendingOperation) -> Result<()> {
        let mut ops = self.lock_ops();
        ops.push(operation);
        self.persist(&ops)
    }

    /// Number of operations currently queued.
    pub fn len(&self) -> usize {
        self.lock_ops().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock_ops().is_empty()
    }

    /// Whether a drain pass is currently running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Copy of the queued operations, FIFO order.
    pub fn pending(&self) -> Vec<PendingOperation> {
        self.lock_ops().clone()
    }

    /// Replay queued operations against the remote store as one atomic batch.
    ///
    /// Idempotent and non-reentrant: a drain started while another is
    /// running is a no-op. Staging failures are retried per operation up to
    /// its budget; quota exhaustion stops the pass leaving the remainder
    /// untouched for the next trigger.
    pub async fn drain(&self, remote: &dyn DocumentStore, quota: &QuotaGate) -> DrainReport {
        let Ok(_guard) = self.drain_gate.try_lock() else {
            tracing::debug!("Drain already in progress, skipping");
            return DrainReport::default();
        };

        self.draining.store(true, Ordering::SeqCst);
        let report = self.drain_locked(remote, quota).await;
        self.draining.store(false, Ordering::SeqCst);

        if report != DrainReport::default() {
            tracing::info!(
                "Drain pass: {} committed, {} retried, {} dropped, {} deferred",
                report.committed,
                report.retried,
                report.dropped,
                report.deferred
            );
        }
        report
    }

    async fn drain_locked(&self, remote: &dyn DocumentStore, quota: &QuotaGate) -> DrainReport {
        let snapshot = self.pending();
        if snapshot.is_empty() {
            return DrainReport::default();
        }

        let mut report = DrainReport::default();
        let mut batch = Vec::new();
        let mut staged_ids = Vec::new();
        let mut failed_ids = Vec::new();

        for (index, operation) in snapshot.iter().enumerate() {
            if !quota.can_perform(QuotaKind::Writes, 1) {
                // Quota exhausted mid-pass: the remainder is not a failure,
                // it is revisited on the next drain trigger.
                report.deferred = snapshot.len() - index;
                tracing::debug!(
                    "Write quota exhausted mid-drain, deferring {} operations",
                    report.deferred
                );
                break;
            }

            match stage(operation) {
                Ok(write) => {
                    quota.record(QuotaKind::Writes, 1);
                    batch.push(write);
                    staged_ids.push(operation.id);
                }
                Err(error) => {
                    tracing::warn!(
                        "Staging failed for {} {} on {}: {error}",
                        operation.kind,
                        operation.document_id,
                        operation.collection_path
                    );
                    failed_ids.push(operation.id);
                }
            }
        }

        if !batch.is_empty() {
            match remote.commit(&batch).await {
                Ok(()) => {
                    report.committed = staged_ids.len();
                    self.remove(&staged_ids);
                }
                Err(error) => {
                    tracing::warn!("Batch commit of {} operations failed: {error}", batch.len());
                    failed_ids.extend(staged_ids);
                }
            }
        }

        let (retried, dropped) = self.mark_failed(&failed_ids);
        report.retried = retried;
        report.dropped = dropped;
        report
    }

    /// Remove committed operations from the queue.
    fn remove(&self, ids: &[OperationId]) {
        let mut ops = self.lock_ops();
        ops.retain(|op| !ids.contains(&op.id));
        if let Err(error) = self.persist(&ops) {
            tracing::warn!("Failed to persist sync queue after commit: {error}");
        }
    }

    /// Increment retry counts for failed operations, dropping any that
    /// exhaust their budget. Returns (retried, dropped).
    fn mark_failed(&self, ids: &[OperationId]) -> (usize, usize) {
        if ids.is_empty() {
            return (0, 0);
        }

        let mut ops = self.lock_ops();
        let mut retried = 0;
        let mut dropped = 0;

        ops.retain_mut(|op| {
            if !ids.contains(&op.id) {
                return true;
            }
            op.retry_count += 1;
            if op.is_exhausted() {
                tracing::error!(
                    "Dropping {} {} on {} after {} failed attempts",
                    op.kind,
                    op.document_id,
                    op.collection_path,
                    op.retry_count
                );
                dropped += 1;
                false
            } else {
                retried += 1;
                true
            }
        });

        if let Err(error) = self.persist(&ops) {
            tracing::warn!("Failed to persist sync queue after retry accounting: {error}");
        }
        (retried, dropped)
    }

    fn persist(&self, ops: &[PendingOperation]) -> Result<()> {
        self.store.put_json(QUEUE_KEY, &ops)
    }

    fn lock_ops(&self) -> MutexGuard<'_, Vec<PendingOperation>> {
        self.ops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Convert a pending operation into a batch write, validating its shape.
fn stage(operation: &PendingOperation) -> Result<BatchWrite> {
    if operation.collection_path.trim().is_empty() || operation.document_id.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Operation collection path and document id cannot be empty".to_string(),
        ));
    }

    match operation.kind {
        OperationKind::Create => {
            let payload = operation.payload.clone().ok_or_else(|| {
                Error::InvalidInput("Create operation is missing its payload".to_string())
            })?;
            let mut fields = payload;
            let updated_at = fields
                .remove("updatedAt")
                .and_then(|value| value.as_i64())
                .unwrap_or(operation.enqueued_at);
            Ok(BatchWrite::Set {
                collection_path: operation.collection_path.clone(),
                document: Document::with_timestamp(
                    operation.document_id.clone(),
                    updated_at,
                    fields,
                ),
            })
        }
        OperationKind::Update => {
            let mut fields = operation.payload.clone().ok_or_else(|| {
                Error::InvalidInput("Update operation is missing its payload".to_string())
            })?;
            fields
                .entry("updatedAt".to_string())
                .or_insert_with(|| Value::from(operation.enqueued_at));
            Ok(BatchWrite::Update {
                collection_path: operation.collection_path.clone(),
                document_id: operation.document_id.clone(),
                fields,
            })
        }
        OperationKind::Delete => Ok(BatchWrite::Delete {
            collection_path: operation.collection_path.clone(),
            document_id: operation.document_id.clone(),
        }),
    }
}
