//! Pending sync operation model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default number of staging retries before an operation is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A unique identifier for a pending operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of mutation a pending operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One pending mutation awaiting replay against the remote store.
///
/// Created whenever a mutation is attempted while disconnected or a direct
/// write fails; destroyed when committed or when retries are exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique operation identifier
    pub id: OperationId,
    /// Mutation kind
    pub kind: OperationKind,
    /// Target collection path in the remote store
    pub collection_path: String,
    /// Target document identifier
    pub document_id: String,
    /// Field payload (present for create/update, absent for delete)
    pub payload: Option<Map<String, Value>>,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Staging failures so far
    pub retry_count: u32,
    /// Staging failures allowed before the operation is dropped
    pub max_retries: u32,
}

impl PendingOperation {
    /// Create a new pending operation with default retry budget.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        collection_path: impl Into<String>,
        document_id: impl Into<String>,
        payload: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            collection_path: collection_path.into(),
            document_id: document_id.into(),
            payload,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Whether this operation has used up its retry budget.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.retry_count > self.max_retries
    }
}
