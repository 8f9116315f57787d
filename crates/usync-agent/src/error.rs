//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] usync_telemetry::TelemetryError),

    #[error("REST client error: {0}")]
    Rest(#[from] usync_rest::RestError),

    #[error("Storage error: {0}")]
    Storage(#[from] usync_engine::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
}

pub type AppResult<T> = Result<T, AppError>;
