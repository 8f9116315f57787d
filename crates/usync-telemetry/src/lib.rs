//! Structured logging for the user snapshot sync agent.
//!
//! - JSON output in production, pretty output in development
//! - `RUST_LOG`-style filtering, defaulting to `info,usync=debug`

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, LogFormat, LoggingConfig};
