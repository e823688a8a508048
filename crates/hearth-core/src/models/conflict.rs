//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::Document;

/// Which side of a divergence holds the newer timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The cached copy was modified more recently
    LocalNewer,
    /// The remote copy was modified more recently
    ServerNewer,
}

/// How divergent copies of the same record are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Pull remote-newer records, push local-newer records (default)
    #[default]
    Server,
    /// The local copy is authoritative; push it regardless of timestamps
    Client,
    /// Mutate neither side; defer to a review queue
    Manual,
}

/// A divergence between the local cache and the remote store for one record.
///
/// Produced by the conflict detector and consumed immediately by the
/// resolver; never persisted beyond one resolution pass (except under the
/// manual policy, where it lands in the review queue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Which side is newer
    pub kind: ConflictKind,
    /// The cached copy
    pub local: Document,
    /// The remote copy
    pub remote: Document,
}
