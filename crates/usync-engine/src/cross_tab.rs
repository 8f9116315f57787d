//! Cross-tab synchronizer.
//!
//! Listens for storage writes made by other tabs on the snapshot key and
//! adopts the stored snapshot without a network round-trip.

use crate::dispatcher::{DispatchOutcome, UpdateDispatcher};
use crate::storage::{StorageChange, TabId, TabStorage};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use usync_core::UserSnapshot;

/// Spawn the synchronizer for one session.
///
/// Subscribes before returning, so no write that happens after this call
/// is missed.
pub fn spawn(
    tab: TabId,
    key: String,
    storage: Arc<dyn TabStorage>,
    dispatcher: Arc<UpdateDispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut changes = storage.subscribe();
    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                () = cancel.cancelled() => break,
                change = changes.recv() => change,
            };
            match change {
                Ok(change) => handle_change(tab, &key, &dispatcher, change),
                Err(RecvError::Lagged(skipped)) => {
                    // Storage holds the latest value; read it instead of replaying
                    warn!(skipped, "Cross-tab listener lagged, resyncing from storage");
                    match storage.get(&key) {
                        Ok(Some(raw)) => adopt(&dispatcher, &raw),
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Failed to read snapshot for resync"),
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        trace!("Cross-tab synchronizer exited");
    })
}

fn handle_change(tab: TabId, key: &str, dispatcher: &UpdateDispatcher, change: StorageChange) {
    if change.origin == tab || change.key != key {
        return;
    }
    match change.value {
        Some(raw) => adopt(dispatcher, &raw),
        // Another tab logged out; this tab's session ends through its own auth signal
        None => debug!(origin = %change.origin, "Snapshot removed by another tab"),
    }
}

fn adopt(dispatcher: &UpdateDispatcher, raw: &str) {
    let snapshot = match UserSnapshot::from_json(raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Discarding malformed cross-tab snapshot");
            return;
        }
    };
    match dispatcher.apply_cross_tab(snapshot) {
        DispatchOutcome::Applied { .. } => {}
        outcome => trace!(?outcome, "Cross-tab snapshot not adopted"),
    }
}
