//! Data models for the sync and media core

mod conflict;
mod document;
mod media;
mod operation;

pub use conflict::{Conflict, ConflictKind, ConflictPolicy};
pub use document::Document;
pub use media::{MediaObject, StorageTier, StoredPayload};
pub use operation::{OperationId, OperationKind, PendingOperation};
