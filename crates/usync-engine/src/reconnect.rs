//! Reconnection scheduling.
//!
//! At most one reconnection timer is pending per session. Asking for another
//! while one is pending is a no-op, so a burst of close/error signals yields a
//! single attempt.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Delay computation for reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay of the first attempt (ms).
    pub base_delay_ms: u64,
    /// Delay cap (ms).
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter (ms). 0 disables jitter.
    pub jitter_ms: u64,
    /// Double the delay on each consecutive attempt.
    pub backoff: bool,
}

impl ReconnectPolicy {
    /// Fixed delay, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            base_delay_ms: ms,
            max_delay_ms: ms,
            jitter_ms: 0,
            backoff: false,
        }
    }

    /// Delay before the given attempt (1-based).
    ///
    /// With backoff: `base * 2^(attempt-1)`, capped at `max_delay_ms`, plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let delay = if self.backoff {
            let exponent = attempt.saturating_sub(1).min(10);
            base.saturating_mul(1u64 << exponent).min(self.max_delay_ms.max(base))
        } else {
            base
        };
        Duration::from_millis(delay + rand_jitter(self.jitter_ms))
    }
}

/// Random jitter in `0..=bound` ms.
fn rand_jitter(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (bound + 1)
}

/// Owns the single pending reconnection timer of a session.
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    /// Session token; pending timers are its children.
    parent: CancellationToken,
    pending: Arc<Mutex<Option<CancellationToken>>>,
    /// Consecutive attempts since the last successful connection.
    attempts: AtomicU32,
    /// Timers scheduled over the scheduler's lifetime.
    scheduled_total: AtomicU64,
}

impl ReconnectScheduler {
    pub fn new(policy: ReconnectPolicy, parent: CancellationToken) -> Self {
        Self {
            policy,
            parent,
            pending: Arc::new(Mutex::new(None)),
            attempts: AtomicU32::new(0),
            scheduled_total: AtomicU64::new(0),
        }
    }

    /// Schedule `on_fire` after the next backoff delay.
    ///
    /// Returns the delay, or `None` when a timer is already pending or the
    /// session has ended. `on_fire` runs at most once and never after
    /// `cancel()` returned.
    pub fn schedule<F>(&self, on_fire: F) -> Option<Duration>
    where
        F: FnOnce() + Send + 'static,
    {
        let token = {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                debug!("Reconnect already pending");
                return None;
            }
            if self.parent.is_cancelled() {
                return None;
            }
            let token = self.parent.child_token();
            *pending = Some(token.clone());
            token
        };

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.scheduled_total.fetch_add(1, Ordering::SeqCst);
        let delay = self.policy.delay_for(attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    {
                        let mut slot = pending.lock();
                        if token.is_cancelled() {
                            return;
                        }
                        *slot = None;
                    }
                    on_fire();
                }
            }
        });

        Some(delay)
    }

    /// Cancel the pending timer, if any. Idempotent.
    pub fn cancel(&self) {
        if let Some(token) = self.pending.lock().take() {
            token.cancel();
            debug!("Pending reconnect cancelled");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Start the next backoff sequence from the base delay.
    pub fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total.load(Ordering::SeqCst)
    }
}
