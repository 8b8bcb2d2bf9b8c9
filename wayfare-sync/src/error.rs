//! Error types for the sync layer.

use crate::remote::RemoteError;
use thiserror::Error;
use wayfare_model::ModelError;
use wayfare_storage::StorageError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No local store, or the host refused persistent storage. Offline
    /// writes are disabled; the online path still works.
    #[error("offline storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// Invalid input or an undecodable ledger entry.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The remote call could not be completed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    /// The pass was cancelled before it finished.
    #[error("sync cancelled")]
    Cancelled,

    /// The pass this caller queued behind failed in another task.
    #[error("sync pass failed: {0}")]
    PassFailed(String),

    /// A sync was requested while offline.
    #[error("device is offline")]
    Offline,

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => SyncError::StorageUnavailable(msg),
            other => SyncError::Storage(other),
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}
