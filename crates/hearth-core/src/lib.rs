//! hearth-core - Sync and media core for Hearth
//!
//! The offline-tolerant, quota-aware synchronization and tiered-media-storage
//! engine that sits between the CRUD/UI layer and the remote document store.
//! It keeps working when the remote store is unreachable, never exceeds the
//! hosting platform's daily operation budget, reconciles divergent copies of
//! the same record, and places binary attachments inline or on external blob
//! services based on size and availability.

pub mod cache;
pub mod config;
pub mod conflict;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod media;
pub mod models;
pub mod quota;
pub mod remote;
pub mod store;
pub mod sync;
mod util;

pub use engine::{MutationOutcome, SyncEngine, SyncStatus};
pub use error::{Error, Result};
