//! Session-scoped real-time synchronization of the cached user snapshot.
//!
//! Keeps one `UserSnapshot` per authenticated session consistent with the
//! server across an unreliable push channel, a REST fallback, several tabs
//! sharing one storage slot, and sleep/wake cycles:
//! - `ConnectionManager`: push channel lifecycle and state machine
//! - `ReconnectScheduler`: at most one pending reconnection attempt
//! - `FallbackPoller`: REST polling while the push channel is down
//! - `UpdateDispatcher`: single sink for every update (dedup, merge, persist, notify)
//! - `cross_tab`: merges snapshots written by other tabs
//! - `visibility`: refreshes after the tab returns to the foreground
//! - `SessionHandle` / `SyncAgent`: session-owned timers and sockets

pub mod agent;
pub mod config;
pub mod connection;
pub mod cross_tab;
pub mod dispatcher;
pub mod error;
pub mod poller;
pub mod reconnect;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod visibility;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::SyncAgent;
pub use config::SyncConfig;
pub use connection::ConnectionManager;
pub use dispatcher::{DispatchOutcome, UpdateDispatcher};
pub use error::{StorageError, StorageResult, SyncError, SyncResult};
pub use poller::FallbackPoller;
pub use reconnect::{ReconnectPolicy, ReconnectScheduler};
pub use refresh::{RefreshOutcome, RefreshTrigger, SnapshotRefresher};
pub use session::{SessionHandle, SyncDeps};
pub use storage::{LocalStorage, StorageChange, TabId, TabStorage};
pub use visibility::Visibility;
