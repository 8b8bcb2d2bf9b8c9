//! Error types for the storage layer.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The host refused persistent storage (cannot open, read-only, disk full,
    /// permission denied). Offline support is unavailable for the session.
    #[error("local storage unavailable: {0}")]
    Unavailable(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// A write would break a unique index (e.g. a trip slug already in use).
    #[error("unique constraint violated in {collection}: {message}")]
    UniqueViolation {
        collection: &'static str,
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Invalid data read back from the store.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A thread panicked while holding the connection.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether this error means the store itself cannot be used.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::ReadOnly
                | ErrorCode::DiskFull
                | ErrorCode::PermissionDenied
                | ErrorCode::NotADatabase,
            ) => StorageError::Unavailable(err.to_string()),
            _ => StorageError::Database(err),
        }
    }
}
