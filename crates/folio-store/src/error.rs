//! Persistence error types.

use thiserror::Error;

/// Errors surfaced by a [`Persistence`](crate::Persistence) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure (constraint, I/O, corrupt file).
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored node kind string that no [`NodeKind`](folio_types::NodeKind) matches.
    #[error("unknown node kind in storage: {0}")]
    UnknownKind(String),

    /// Backend refused the write (e.g. fault injection in tests).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for persistence operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
