//! REST fallback poller.
//!
//! Active only while the push channel is down. Each tick runs one
//! fetch-and-compare; failures are logged and retried on the next tick,
//! never escalated into the connection state.

use crate::refresh::{RefreshOutcome, RefreshTrigger, SnapshotRefresher};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Fallback poller for one session.
pub struct FallbackPoller {
    refresher: Arc<SnapshotRefresher>,
    interval: Duration,
    /// Session token; poll loops are its children.
    parent: CancellationToken,
    active: Mutex<Option<CancellationToken>>,
    /// Ticks run since creation.
    ticks: Arc<AtomicU64>,
}

impl FallbackPoller {
    pub fn new(
        refresher: Arc<SnapshotRefresher>,
        interval: Duration,
        parent: CancellationToken,
    ) -> Self {
        Self {
            refresher,
            interval,
            parent,
            active: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start polling. No-op while already active or after the session ended.
    ///
    /// The first tick fires one interval after start.
    pub fn start(&self) {
        let token = {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|t| !t.is_cancelled()) {
                trace!("Poller already active");
                return;
            }
            if self.parent.is_cancelled() {
                return;
            }
            let token = self.parent.child_token();
            *active = Some(token.clone());
            token
        };

        let refresher = Arc::clone(&self.refresher);
        let ticks = Arc::clone(&self.ticks);
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        ticks.fetch_add(1, Ordering::SeqCst);
                        match refresher.refresh_until(RefreshTrigger::Poll, &token).await {
                            Some(Ok(RefreshOutcome::Unchanged)) => trace!("Silent poll tick"),
                            Some(Ok(RefreshOutcome::Dispatched(outcome))) => {
                                debug!(?outcome, "Poll tick dispatched update");
                            }
                            // Logged by the refresher; retried next tick
                            Some(Err(_)) => {}
                            None => break,
                        }
                    }
                }
            }
        });
        info!(interval_ms = self.interval.as_millis() as u64, "Fallback poller started");
    }

    /// Stop polling immediately. Idempotent.
    ///
    /// A fetch in flight is abandoned and its result never dispatched.
    pub fn stop(&self) {
        if let Some(token) = self.active.lock().take() {
            token.cancel();
            info!("Fallback poller stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}
