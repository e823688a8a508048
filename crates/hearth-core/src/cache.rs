//! Local fallback cache.
//!
//! A durable, per-user, per-data-type mirror of remote collections. Serves
//! reads when the remote store is unreachable and acts as the comparison
//! baseline for conflict detection. Synchronous with respect to the caller;
//! no eviction policy (explicit cleanup only).

use std::sync::Arc;

use crate::error::Result;
use crate::models::Document;
use crate::store::KvStore;

/// Durable mirror of remote collections, keyed by `(data_type, user_id)`.
pub struct FallbackCache {
    store: Arc<KvStore>,
}

impl FallbackCache {
    /// Build a cache over the given store.
    #[must_use]
    pub const fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }

    /// Read the cached collection for `(data_type, user_id)`.
    ///
    /// Returns an empty collection when nothing has been cached yet.
    pub fn read(&self, data_type: &str, user_id: &str) -> Result<Vec<Document>> {
        let key = Self::key(data_type, user_id);
        Ok(self.store.get_json(&key)?.unwrap_or_default())
    }

    /// Replace the cached collection for `(data_type, user_id)`.
    pub fn write(&self, data_type: &str, user_id: &str, records: &[Document]) -> Result<()> {
        let key = Self::key(data_type, user_id);
        self.store.put_json(&key, &records)
    }

    /// Remove the cached collection for `(data_type, user_id)`.
    pub fn clear(&self, data_type: &str, user_id: &str) -> Result<()> {
        let key = Self::key(data_type, user_id);
        self.store.delete(&key)
    }

    fn key(data_type: &str, user_id: &str) -> String {
        format!("cache/{data_type}/{user_id}")
    }
}
