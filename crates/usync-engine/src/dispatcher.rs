//! Update dispatcher.
//!
//! Single sink for every update, whatever its source. For each event it
//! checks ordering, merges into the cached snapshot, persists to the tab
//! storage slot, publishes the new snapshot and emits notifications. The
//! whole sequence runs under one lock, so two concurrent dispatches are
//! totally ordered and never interleave their compare and write steps.

use crate::storage::{TabId, TabStorage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};
use usync_core::{
    Notification, NotificationPolicy, UpdateEvent, UpdatePayload, UpdateSource, UserSnapshot,
};

/// Result of dispatching one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Merged into the snapshot.
    Applied { notifications: usize },
    /// Same timestamp as the last accepted update.
    Duplicate,
    /// Older than the last accepted update.
    Stale,
    /// Payload belongs to another identity.
    Rejected(String),
    /// No payload; nothing to merge.
    Ignored,
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Cached snapshot and whether it came from a full payload.
///
/// A baseline built from partial pushes only knows the fields those pushes
/// carried. The first full snapshot after it is compared on those fields
/// alone, everything else it brings is adopted without notifying.
#[derive(Default)]
struct Cached {
    snapshot: Option<UserSnapshot>,
    complete: bool,
}

/// Owner of the session's cached snapshot.
pub struct UpdateDispatcher {
    identity: String,
    tab: TabId,
    storage_key: String,
    storage: Arc<dyn TabStorage>,
    policy: NotificationPolicy,
    current: Mutex<Cached>,
    snapshot_tx: watch::Sender<Option<UserSnapshot>>,
    notify_tx: broadcast::Sender<Notification>,
}

impl UpdateDispatcher {
    pub fn new(
        identity: impl Into<String>,
        tab: TabId,
        storage_key: impl Into<String>,
        storage: Arc<dyn TabStorage>,
        policy: NotificationPolicy,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            identity: identity.into(),
            tab,
            storage_key: storage_key.into(),
            storage,
            policy,
            current: Mutex::new(Cached::default()),
            snapshot_tx,
            notify_tx,
        }
    }

    /// Adopt the snapshot already in storage if it belongs to this identity.
    ///
    /// Returns whether a snapshot was loaded. A snapshot of another identity
    /// or an unreadable slot is left alone and the session starts empty.
    pub fn warm_start(&self) -> bool {
        let raw = match self.storage.get(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to read stored snapshot");
                return false;
            }
        };

        let snapshot = match UserSnapshot::from_json(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored snapshot");
                return false;
            }
        };

        if snapshot.identity != self.identity {
            debug!(stored = %snapshot.identity, "Stored snapshot belongs to another identity");
            return false;
        }

        let mut current = self.current.lock();
        if current.snapshot.is_some() {
            return false;
        }
        info!(last_timestamp = ?snapshot.last_timestamp, "Warm start from stored snapshot");
        current.snapshot = Some(snapshot.clone());
        current.complete = true;
        self.snapshot_tx.send_replace(Some(snapshot));
        true
    }

    /// Apply an update.
    pub fn dispatch(&self, event: UpdateEvent) -> DispatchOutcome {
        let mut current = self.current.lock();

        if let Some(last) = current.snapshot.as_ref().and_then(|s| s.last_timestamp) {
            if event.timestamp == last {
                trace!(kind = %event.kind, source = %event.source, "Duplicate update dropped");
                return DispatchOutcome::Duplicate;
            }
            if event.timestamp < last {
                debug!(
                    kind = %event.kind,
                    source = %event.source,
                    timestamp = %event.timestamp,
                    last = %last,
                    "Stale update dropped"
                );
                return DispatchOutcome::Stale;
            }
        }

        let (mut next, complete, notifications) = match event.payload {
            Some(UpdatePayload::Full(snapshot)) => {
                if snapshot.identity != self.identity {
                    warn!(
                        received = %snapshot.identity,
                        source = %event.source,
                        "Update for another identity rejected"
                    );
                    return DispatchOutcome::Rejected(snapshot.identity);
                }
                let notifications = match &current.snapshot {
                    // The first full snapshot of a session is a baseline, not a change
                    None => Vec::new(),
                    Some(before) if current.complete => self.policy.classify(before, &snapshot),
                    Some(before) => self.policy.classify(before, &known_fields(&snapshot, before)),
                };
                (snapshot, true, notifications)
            }
            Some(UpdatePayload::Partial(fields)) => {
                // A partial payload describes a change even without a baseline
                let before = current
                    .snapshot
                    .clone()
                    .unwrap_or_else(|| UserSnapshot::new(self.identity.clone()));
                let mut after = before.clone();
                after.merge(&fields);
                let notifications = self.policy.classify(&before, &after);
                (after, current.complete, notifications)
            }
            None => {
                debug!(kind = %event.kind, source = %event.source, "Update without payload ignored");
                return DispatchOutcome::Ignored;
            }
        };
        next.last_timestamp = Some(event.timestamp);

        self.persist(&next);
        current.snapshot = Some(next.clone());
        current.complete = complete;
        self.snapshot_tx.send_replace(Some(next));

        let count = notifications.len();
        for notification in notifications {
            self.emit(notification);
        }

        debug!(
            kind = %event.kind,
            source = %event.source,
            timestamp = %event.timestamp,
            notifications = count,
            "Update applied"
        );
        DispatchOutcome::Applied {
            notifications: count,
        }
    }

    /// Adopt a snapshot written by another tab.
    ///
    /// The other tab already notified its user and persisted the value, so
    /// this only updates memory and the snapshot watch.
    pub fn apply_cross_tab(&self, snapshot: UserSnapshot) -> DispatchOutcome {
        if snapshot.identity != self.identity {
            debug!(received = %snapshot.identity, "Cross-tab snapshot for another identity");
            return DispatchOutcome::Rejected(snapshot.identity);
        }

        let mut current = self.current.lock();
        let last = current.snapshot.as_ref().and_then(|s| s.last_timestamp);
        match (snapshot.last_timestamp, last) {
            (Some(incoming), Some(last)) if incoming == last => return DispatchOutcome::Duplicate,
            (Some(incoming), Some(last)) if incoming < last => return DispatchOutcome::Stale,
            (None, Some(_)) => return DispatchOutcome::Stale,
            _ => {}
        }

        debug!(source = %UpdateSource::CrossTab, timestamp = ?snapshot.last_timestamp, "Cross-tab snapshot adopted");
        current.snapshot = Some(snapshot.clone());
        current.complete = true;
        self.snapshot_tx.send_replace(Some(snapshot));
        DispatchOutcome::Applied { notifications: 0 }
    }

    /// Emit a notification that is not derived from a snapshot change.
    pub fn publish(&self, notification: Notification) {
        self.emit(notification);
    }

    /// Remove the persisted snapshot (logout).
    pub fn clear(&self) {
        *self.current.lock() = Cached::default();
        if let Err(e) = self.storage.remove(self.tab, &self.storage_key) {
            warn!(error = %e, "Failed to clear stored snapshot");
        }
        self.snapshot_tx.send_replace(None);
    }

    pub fn current(&self) -> Option<UserSnapshot> {
        self.current.lock().snapshot.clone()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.current
            .lock()
            .snapshot
            .as_ref()
            .and_then(|s| s.last_timestamp)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    pub fn snapshot_watch(&self) -> watch::Receiver<Option<UserSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    fn persist(&self, snapshot: &UserSnapshot) {
        let raw = match snapshot.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize snapshot");
                return;
            }
        };
        // In-memory state stays authoritative when the slot is unwritable
        if let Err(e) = self.storage.set(self.tab, &self.storage_key, &raw) {
            warn!(error = %e, "Failed to persist snapshot");
        }
    }

    fn emit(&self, notification: Notification) {
        if self.notify_tx.send(notification).is_err() {
            trace!("No notification subscribers");
        }
    }
}

/// `full` restricted to the fields `known` has.
fn known_fields(full: &UserSnapshot, known: &UserSnapshot) -> UserSnapshot {
    let mut view = UserSnapshot::new(full.identity.clone());
    view.fields = full
        .fields
        .iter()
        .filter(|(name, _)| known.fields.contains_key(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    view
}
