//! In-memory document store for tests and offline development.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::Document;

use super::{BatchWrite, DocumentStore};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// [`DocumentStore`] implementation backed by process memory.
#[derive(Default)]
pub struct MemoryRemote {
    collections: Mutex<Collections>,
}

impl MemoryRemote {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in `collection_path`.
    pub fn len(&self, collection_path: &str) -> usize {
        self.lock()
            .get(collection_path)
            .map_or(0, BTreeMap::len)
    }

    /// Whether `collection_path` holds no documents.
    pub fn is_empty(&self, collection_path: &str) -> bool {
        self.len(collection_path) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn apply(collections: &mut Collections, write: &BatchWrite) -> Result<()> {
        match write {
            BatchWrite::Set {
                collection_path,
                document,
            } => {
                collections
                    .entry(collection_path.clone())
                    .or_default()
                    .insert(document.id.clone(), document.clone());
                Ok(())
            }
            BatchWrite::Update {
                collection_path,
                document_id,
                fields,
            } => {
                let existing = collections
                    .get_mut(collection_path)
                    .and_then(|collection| collection.get_mut(document_id))
                    .ok_or_else(|| {
                        Error::Remote(format!(
                            "update target missing: {collection_path}/{document_id}"
                        ))
                    })?;
                merge_fields(existing, fields);
                Ok(())
            }
            BatchWrite::Delete {
                collection_path,
                document_id,
            } => {
                if let Some(collection) = collections.get_mut(collection_path) {
                    collection.remove(document_id);
                }
                Ok(())
            }
        }
    }
}

fn merge_fields(document: &mut Document, fields: &Map<String, Value>) {
    for (name, value) in fields {
        if name == "updatedAt" {
            if let Some(timestamp) = value.as_i64() {
                document.updated_at = timestamp;
            }
            continue;
        }
        document.fields.insert(name.clone(), value.clone());
    }
}

#[async_trait]
impl DocumentStore for MemoryRemote {
    async fn get(&self, collection_path: &str, document_id: &str) -> Result<Option<Document>> {
        Ok(self
            .lock()
            .get(collection_path)
            .and_then(|collection| collection.get(document_id))
            .cloned())
    }

    async fn set(&self, collection_path: &str, document: &Document) -> Result<()> {
        let mut collections = self.lock();
        Self::apply(
            &mut collections,
            &BatchWrite::Set {
                collection_path: collection_path.to_string(),
                document: document.clone(),
            },
        )
    }

    async fn update(
        &self,
        collection_path: &str,
        document_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<()> {
        let mut collections = self.lock();
        Self::apply(
            &mut collections,
            &BatchWrite::Update {
                collection_path: collection_path.to_string(),
                document_id: document_id.to_string(),
                fields: fields.clone(),
            },
        )
    }

    async fn delete(&self, collection_path: &str, document_id: &str) -> Result<()> {
        let mut collections = self.lock();
        Self::apply(
            &mut collections,
            &BatchWrite::Delete {
                collection_path: collection_path.to_string(),
                document_id: document_id.to_string(),
            },
        )
    }

    async fn query(&self, collection_path: &str) -> Result<Vec<Document>> {
        Ok(self
            .lock()
            .get(collection_path)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit(&self, batch: &[BatchWrite]) -> Result<()> {
        // Stage against a copy so a failing write leaves nothing applied.
        let mut collections = self.lock();
        let mut staged = collections.clone();
        for write in batch {
            Self::apply(&mut staged, write)?;
        }
        *collections = staged;
        Ok(())
    }
}
