//! Core domain types for user snapshot synchronization.
//!
//! This crate provides the types shared by every data source and consumer:
//! - `UserSnapshot`: cached account status fields with the last accepted timestamp
//! - `UpdateEvent`: a single observed update (push, poll, manual, cross-tab)
//! - `ConnectionState`: push channel state with its transition table
//! - `Notification`: UI-agnostic change notifications derived from old vs new snapshots
//! - `SnapshotSource`: port for fetching the authoritative snapshot

pub mod error;
pub mod event;
pub mod notification;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod state;

pub use error::{CoreError, FetchError, Result};
pub use event::{UpdateEvent, UpdateKind, UpdatePayload, UpdateSource};
pub use notification::{Notification, NotificationPolicy};
pub use session::Credentials;
pub use snapshot::{FieldChange, Fields, UserSnapshot};
pub use source::SnapshotSource;
pub use state::ConnectionState;
