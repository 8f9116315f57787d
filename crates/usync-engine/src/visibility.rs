//! Visibility refresher.
//!
//! When the tab returns to the foreground, waits a short settle delay and
//! runs one fetch-and-compare, whatever the connection state. A connected
//! channel does not prove that nothing was missed while suspended.

use crate::refresh::{RefreshOutcome, RefreshTrigger, SnapshotRefresher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Foreground state of the tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Spawn the refresher for one session.
///
/// Every signal that sets the tab `Visible` triggers a refresh; the state
/// at spawn time does not. A `Hidden`/`Visible` pair sent back to back may
/// coalesce into the second value, which still counts.
pub fn spawn(
    mut visibility: watch::Receiver<Visibility>,
    refresher: Arc<SnapshotRefresher>,
    settle: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    visibility.borrow_and_update();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = visibility.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *visibility.borrow_and_update() != Visibility::Visible {
                continue;
            }

            debug!(settle_ms = settle.as_millis() as u64, "Tab visible again");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(settle) => {}
            }
            if *visibility.borrow() == Visibility::Hidden {
                trace!("Hidden again before settling, skipping refresh");
                continue;
            }
            match refresher.refresh_until(RefreshTrigger::Visibility, &cancel).await {
                Some(Ok(RefreshOutcome::Unchanged)) => trace!("Foreground refresh found nothing new"),
                Some(Ok(RefreshOutcome::Dispatched(outcome))) => {
                    debug!(?outcome, "Foreground refresh dispatched update");
                }
                // Logged by the refresher; the next wake retries
                Some(Err(_)) => trace!("Foreground refresh failed"),
                None => break,
            }
        }
        trace!("Visibility refresher exited");
    })
}
