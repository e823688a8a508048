//! Remote document store boundary.
//!
//! The hosted document store is opaque to the core: everything it needs is
//! expressed by the [`DocumentStore`] trait. Production wires the hosted
//! platform's client behind this trait; tests and offline development use
//! [`memory::MemoryRemote`].

mod memory;

pub use memory::MemoryRemote;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::Document;

/// One staged mutation inside an atomic batch commit.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWrite {
    /// Create or replace a document
    Set {
        collection_path: String,
        document: Document,
    },
    /// Merge fields into an existing document
    Update {
        collection_path: String,
        document_id: String,
        fields: Map<String, Value>,
    },
    /// Remove a document
    Delete {
        collection_path: String,
        document_id: String,
    },
}

/// Networked key-document service holding authoritative per-user collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document by id.
    async fn get(&self, collection_path: &str, document_id: &str) -> Result<Option<Document>>;

    /// Create or replace a document.
    async fn set(&self, collection_path: &str, document: &Document) -> Result<()>;

    /// Merge fields into an existing document.
    async fn update(
        &self,
        collection_path: &str,
        document_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<()>;

    /// Remove a document.
    async fn delete(&self, collection_path: &str, document_id: &str) -> Result<()>;

    /// List all documents in a collection.
    async fn query(&self, collection_path: &str) -> Result<Vec<Document>>;

    /// Apply a batch of staged writes as one atomic unit: all apply or none do.
    async fn commit(&self, batch: &[BatchWrite]) -> Result<()>;
}

/// Remote collection path for a user's data type.
#[must_use]
pub fn collection_path(data_type: &str, user_id: &str) -> String {
    format!("users/{user_id}/{data_type}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_path_scopes_by_user_then_data_type() {
        assert_eq!(collection_path("inventory", "u1"), "users/u1/inventory");
    }
}
