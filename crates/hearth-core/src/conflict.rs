//! Conflict detection and resolution.
//!
//! Before a full bidirectional sync of a data type, the local fallback
//! cache is compared against the remote store and divergences are resolved
//! record by record under the configured policy. Records present on only
//! one side are not conflicts; they are one-sided creates/deletes and pass
//! through normally.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::cache::FallbackCache;
use crate::error::Result;
use crate::models::{Conflict, ConflictKind, ConflictPolicy, Document, OperationKind, PendingOperation};
use crate::remote::collection_path;
use crate::sync::SyncQueue;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Number of conflicting records resolved (or deferred under `Manual`)
    pub resolved: usize,
}

/// Compare local and remote copies by `updated_at` and list divergences.
///
/// Equal timestamps are not conflicts.
#[must_use]
pub fn detect(local: &[Document], remote: &[Document]) -> Vec<Conflict> {
    let remote_by_id: BTreeMap<&str, &Document> =
        remote.iter().map(|doc| (doc.id.as_str(), doc)).collect();

    local
        .iter()
        .filter_map(|local_doc| {
            let remote_doc = remote_by_id.get(local_doc.id.as_str())?;
            let kind = match local_doc.updated_at.cmp(&remote_doc.updated_at) {
                std::cmp::Ordering::Greater => ConflictKind::LocalNewer,
                std::cmp::Ordering::Less => ConflictKind::ServerNewer,
                std::cmp::Ordering::Equal => return None,
            };
            Some(Conflict {
                kind,
                local: local_doc.clone(),
                remote: (*remote_doc).clone(),
            })
        })
        .collect()
}

/// Applies the configured resolution policy to detected conflicts.
pub struct ConflictResolver {
    policy: ConflictPolicy,
    reviews: Mutex<Vec<Conflict>>,
}

impl ConflictResolver {
    /// Build a resolver for the given policy.
    #[must_use]
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            reviews: Mutex::new(Vec::new()),
        }
    }

    /// The policy this resolver applies.
    #[must_use]
    pub const fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Conflicts deferred for external review under the `Manual` policy.
    pub fn pending_reviews(&self) -> Vec<Conflict> {
        self.lock_reviews().clone()
    }

    /// Reconcile the cached collection against a fresh remote snapshot.
    ///
    /// Each conflicting record is resolved independently; one record's
    /// resolution failure does not block others. Remote-only documents are
    /// merged into the cache as part of the pull.
    pub fn resolve(
        &self,
        data_type: &str,
        user_id: &str,
        cache: &FallbackCache,
        queue: &SyncQueue,
        remote_docs: &[Document],
    ) -> Result<ReconcileOutcome> {
        let local_docs = cache.read(data_type, user_id)?;
        let conflicts = detect(&local_docs, remote_docs);

        let mut merged: BTreeMap<String, Document> = local_docs
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        // One-sided remote creates pass straight into the cache.
        for doc in remote_docs {
            merged
                .entry(doc.id.clone())
                .or_insert_with(|| doc.clone());
        }

        let mut resolved = 0;
        for conflict in conflicts {
            match self.policy {
                ConflictPolicy::Server => match conflict.kind {
                    ConflictKind::ServerNewer => {
                        merged.insert(conflict.remote.id.clone(), conflict.remote.clone());
                        resolved += 1;
                    }
                    ConflictKind::LocalNewer => {
                        if self.push_local(data_type, user_id, queue, &conflict.local) {
                            resolved += 1;
                        }
                    }
                },
                ConflictPolicy::Client => {
                    // The local copy is authoritative regardless of kind.
                    if self.push_local(data_type, user_id, queue, &conflict.local) {
                        resolved += 1;
                    }
                }
                ConflictPolicy::Manual => {
                    self.lock_reviews().push(conflict);
                    resolved += 1;
                }
            }
        }

        let records: Vec<Document> = merged.into_values().collect();
        cache.write(data_type, user_id, &records)?;

        Ok(ReconcileOutcome { resolved })
    }

    /// Enqueue an update pushing the local version to the remote store on
    /// the next drain. Enqueue failure is logged and skips only this record.
    fn push_local(
        &self,
        data_type: &str,
        user_id: &str,
        queue: &SyncQueue,
        local: &Document,
    ) -> bool {
        let mut payload = local.fields.clone();
        payload.insert("updatedAt".to_string(), Value::from(local.updated_at));

        let operation = PendingOperation::new(
            OperationKind::Update,
            collection_path(data_type, user_id),
            local.id.clone(),
            Some(payload),
        );

        match queue.enqueue(operation) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    "Failed to enqueue conflict push for {data_type}/{}: {error}",
                    local.id
                );
                false
            }
        }
    }

    fn lock_reviews(&self) -> MutexGuard<'_, Vec<Conflict>> {
        self.reviews
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
