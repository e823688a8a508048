//! Error types for hearth-core

use thiserror::Error;

/// Result type alias using hearth-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hearth-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local key-value store error
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Daily operation quota would be exceeded
    #[error("Daily {kind} quota exceeded ({used}/{limit})")]
    QuotaExceeded {
        /// Which counter was exhausted ("reads" or "writes")
        kind: &'static str,
        /// Units consumed so far today
        used: u64,
        /// Daily ceiling
        limit: u64,
    },

    /// Remote document store error
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Media compression or encoding failure (the final inline fallback failed)
    #[error("Media encoding error: {0}")]
    MediaEncoding(String),
}
