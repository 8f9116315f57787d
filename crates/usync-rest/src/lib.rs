//! REST snapshot client for user snapshot synchronization.
//!
//! Fetches the signed-in account's status snapshot from the profile endpoint.
//! Used by the fallback poller, the visibility refresher, manual refreshes,
//! and the initial snapshot request after the push channel connects.

pub mod client;
pub mod error;

pub use client::ProfileClient;
pub use error::{RestError, RestResult};
