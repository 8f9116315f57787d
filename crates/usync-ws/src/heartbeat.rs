//! Heartbeat monitor for the push channel.
//!
//! While connected, sends a liveness probe every interval. Sending is the
//! whole contract: a missing pong is not treated as a failure, the transport's
//! own close/error event is the authoritative liveness signal. If a probe
//! cannot be sent the monitor cancels itself until it is started again.

use crate::ws_write_handle::WsWriteHandle;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Heartbeat monitor for one session.
pub struct HeartbeatMonitor {
    /// Probe interval.
    interval: Duration,
    /// Last ping sent time.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Last pong received time.
    last_pong: RwLock<Option<DateTime<Utc>>>,
    /// Round-trip time of the last answered ping.
    last_rtt_ms: RwLock<Option<i64>>,
    /// Pings sent since the monitor was created.
    pings_sent: RwLock<u64>,
    /// Cancellation token of the running probe loop.
    active: Mutex<Option<CancellationToken>>,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_ping: RwLock::new(None),
            last_pong: RwLock::new(None),
            last_rtt_ms: RwLock::new(None),
            pings_sent: RwLock::new(0),
            active: Mutex::new(None),
        }
    }

    /// Start probing over `writer`, replacing any running loop.
    ///
    /// The loop is a child of `parent` and ends with it.
    pub fn start(self: &Arc<Self>, writer: WsWriteHandle, parent: &CancellationToken) {
        let token = parent.child_token();
        if let Some(previous) = self.active.lock().replace(token.clone()) {
            previous.cancel();
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + monitor.interval, monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if writer.ping().await.is_err() {
                            debug!("Push channel not open, heartbeat stopping");
                            token.cancel();
                            break;
                        }
                        monitor.record_ping();
                    }
                }
            }
        });
        debug!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started");
    }

    /// Stop probing. Idempotent.
    pub fn stop(&self) {
        if let Some(token) = self.active.lock().take() {
            token.cancel();
            debug!("Heartbeat stopped");
        }
    }

    /// Whether a probe loop is running.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
        *self.pings_sent.write() += 1;
    }

    /// Record that a pong was received.
    pub fn record_pong(&self) {
        let now = Utc::now();
        *self.last_pong.write() = Some(now);

        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (now - ping_time).num_milliseconds();
            *self.last_rtt_ms.write() = Some(rtt_ms);
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Get heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            last_ping: *self.last_ping.read(),
            last_pong: *self.last_pong.read(),
            last_rtt_ms: *self.last_rtt_ms.read(),
            pings_sent: *self.pings_sent.read(),
            running: self.is_running(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_rtt_ms: Option<i64>,
    pub pings_sent: u64,
    pub running: bool,
}
