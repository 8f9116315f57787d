//! Headless user snapshot sync agent.
//!
//! Wires the sync engine to its real collaborators:
//! - WebSocket push channel and REST profile endpoint
//! - Optional file-backed storage owned by this one process
//! - Credentials from the environment; shutdown keeps the cached snapshot
//! - Suspend/resume detection standing in for tab visibility

pub mod app;
pub mod config;
pub mod error;
pub mod wake;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
