//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    #[error("A global logger is already installed")]
    AlreadyInitialized,
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
