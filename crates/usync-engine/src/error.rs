//! Engine error types.

use thiserror::Error;
use usync_core::{CoreError, FetchError};

/// Storage slot errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Sync engine errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Snapshot fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Session ended")]
    SessionEnded,
}

pub type SyncResult<T> = Result<T, SyncError>;
