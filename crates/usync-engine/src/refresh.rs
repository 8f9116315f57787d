//! Fetch-and-compare refresh.
//!
//! One operation shared by the fallback poller, the initial snapshot request,
//! the visibility refresher and user-triggered refreshes: fetch the
//! authoritative snapshot, compare it with the cached one, and hand a full
//! update to the dispatcher only when the fields differ.

use crate::dispatcher::{DispatchOutcome, UpdateDispatcher};
use crate::error::SyncResult;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use usync_core::{
    Credentials, FetchError, Notification, SnapshotSource, UpdateEvent, UpdateKind, UpdateSource,
    UserSnapshot,
};

/// Why a refresh runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Fallback poller tick.
    Poll,
    /// Push channel just connected.
    Initial,
    /// Tab returned to the foreground.
    Visibility,
    /// Explicitly requested by the user.
    User,
}

impl RefreshTrigger {
    pub fn source(&self) -> UpdateSource {
        match self {
            Self::Poll => UpdateSource::Poll,
            Self::Initial | Self::Visibility | Self::User => UpdateSource::Manual,
        }
    }

    /// Only user-triggered failures reach the UI; the rest retry silently.
    pub fn surfaces_errors(&self) -> bool {
        matches!(self, Self::User)
    }
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Initial => write!(f, "initial"),
            Self::Visibility => write!(f, "visibility"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Result of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fetched snapshot matches the cached one; nothing dispatched.
    Unchanged,
    /// Fields differed; the update went to the dispatcher.
    Dispatched(DispatchOutcome),
}

/// Fetch-and-compare bound to one session.
pub struct SnapshotRefresher {
    source: Arc<dyn SnapshotSource>,
    dispatcher: Arc<UpdateDispatcher>,
    credentials: Credentials,
}

impl SnapshotRefresher {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        dispatcher: Arc<UpdateDispatcher>,
        credentials: Credentials,
    ) -> Self {
        Self {
            source,
            dispatcher,
            credentials,
        }
    }

    /// Fetch and compare.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> SyncResult<RefreshOutcome> {
        let fetched = self.source.fetch(&self.credentials).await;
        self.settle(trigger, fetched)
    }

    /// Fetch and compare unless `cancel` fires first.
    ///
    /// Returns `None` when cancelled; a response that arrives after
    /// cancellation is dropped without touching the snapshot.
    pub async fn refresh_until(
        &self,
        trigger: RefreshTrigger,
        cancel: &CancellationToken,
    ) -> Option<SyncResult<RefreshOutcome>> {
        if cancel.is_cancelled() {
            return None;
        }
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            fetched = self.source.fetch(&self.credentials) => fetched,
        };
        if cancel.is_cancelled() {
            debug!(%trigger, "Refresh result dropped after cancellation");
            return None;
        }
        Some(self.settle(trigger, fetched))
    }

    fn settle(
        &self,
        trigger: RefreshTrigger,
        fetched: Result<UserSnapshot, FetchError>,
    ) -> SyncResult<RefreshOutcome> {
        match fetched {
            Ok(snapshot) => Ok(self.apply_fetched(trigger, snapshot)),
            Err(e) => {
                warn!(%trigger, error = %e, "Snapshot refresh failed");
                if trigger.surfaces_errors() {
                    self.dispatcher.publish(Notification::RefreshFailed {
                        message: e.to_string(),
                    });
                }
                Err(e.into())
            }
        }
    }

    fn apply_fetched(&self, trigger: RefreshTrigger, snapshot: UserSnapshot) -> RefreshOutcome {
        if let Some(current) = self.dispatcher.current() {
            if current.same_fields(&snapshot) {
                debug!(%trigger, "Refresh unchanged");
                return RefreshOutcome::Unchanged;
            }
        }

        // Stamped at fetch completion
        let event = UpdateEvent::full(
            UpdateKind::SnapshotRefresh,
            snapshot,
            Utc::now(),
            trigger.source(),
        );
        RefreshOutcome::Dispatched(self.dispatcher.dispatch(event))
    }
}
