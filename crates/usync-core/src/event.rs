//! Update events.
//!
//! An `UpdateEvent` is created where an update is observed (push message,
//! poll response, storage signal), consumed exactly once by the dispatcher,
//! then dropped. Only its effect on the `UserSnapshot` is persisted.

use crate::snapshot::{Fields, UserSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of change an update describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    VerificationChanged,
    StatusChanged,
    SnapshotRefresh,
    #[serde(other)]
    Other,
}

impl UpdateKind {
    /// Whether updates of this kind carry a full snapshot.
    ///
    /// Only `snapshot-refresh` replaces the snapshot wholesale; every other
    /// kind carries the changed fields only.
    pub fn carries_full_snapshot(&self) -> bool {
        matches!(self, Self::SnapshotRefresh)
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerificationChanged => write!(f, "verification-changed"),
            Self::StatusChanged => write!(f, "status-changed"),
            Self::SnapshotRefresh => write!(f, "snapshot-refresh"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Where an update was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateSource {
    Push,
    Poll,
    Manual,
    CrossTab,
}

impl std::fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Poll => write!(f, "poll"),
            Self::Manual => write!(f, "manual"),
            Self::CrossTab => write!(f, "cross-tab"),
        }
    }
}

/// Snapshot payload of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    /// Replaces the cached snapshot wholesale.
    Full(UserSnapshot),
    /// Merged field-by-field into the cached snapshot.
    Partial(Fields),
}

/// A single observed update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub kind: UpdateKind,
    pub payload: Option<UpdatePayload>,
    pub timestamp: DateTime<Utc>,
    pub source: UpdateSource,
    /// Optional human-readable message attached by the server.
    pub message: Option<String>,
}

impl UpdateEvent {
    /// Full snapshot update.
    pub fn full(
        kind: UpdateKind,
        snapshot: UserSnapshot,
        timestamp: DateTime<Utc>,
        source: UpdateSource,
    ) -> Self {
        Self {
            kind,
            payload: Some(UpdatePayload::Full(snapshot)),
            timestamp,
            source,
            message: None,
        }
    }

    /// Partial snapshot update.
    pub fn partial(
        kind: UpdateKind,
        fields: Fields,
        timestamp: DateTime<Utc>,
        source: UpdateSource,
    ) -> Self {
        Self {
            kind,
            payload: Some(UpdatePayload::Partial(fields)),
            timestamp,
            source,
            message: None,
        }
    }

    /// Attach a server message.
    #[must_use]
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}
