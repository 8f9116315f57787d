//! Error types for usync-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot fetch failures.
///
/// Returned by every `SnapshotSource`. Callers decide whether a failure is
/// logged and retried (polling) or surfaced (user-triggered refresh).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed snapshot payload: {0}")]
    Malformed(String),
}

impl From<CoreError> for FetchError {
    fn from(err: CoreError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
