//! Suspend/resume detection.
//!
//! A headless agent has no foreground signal. The monotonic clock stops
//! while the host sleeps and the wall clock does not, so a wall-clock gap
//! well beyond the monotonic one means the host just woke up. Each wake is
//! reported as a `Hidden` then `Visible` pair on the visibility channel.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};
use usync_engine::Visibility;

/// Samples both clocks at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct WakeDetector {
    check_interval: Duration,
    threshold: Duration,
}

impl WakeDetector {
    pub fn new(check_interval: Duration, threshold: Duration) -> Self {
        Self {
            check_interval,
            threshold,
        }
    }

    pub fn spawn(
        self,
        visibility: watch::Sender<Visibility>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut wall = Utc::now();
            let mut mono = Instant::now();

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let (now_wall, now_mono) = (Utc::now(), Instant::now());
                if let Some(gap) = suspended_for(
                    now_wall - wall,
                    now_mono.duration_since(mono),
                    self.threshold,
                ) {
                    info!(gap_ms = gap.as_millis() as u64, "Host resumed from suspend");
                    signal_resume(&visibility);
                }
                wall = now_wall;
                mono = now_mono;
            }
            trace!("Wake detector exited");
        })
    }
}

/// Time the host spent suspended, if it exceeds `threshold`.
///
/// A wall clock that moved backwards never counts.
pub fn suspended_for(
    wall_elapsed: chrono::TimeDelta,
    mono_elapsed: Duration,
    threshold: Duration,
) -> Option<Duration> {
    let wall_elapsed = wall_elapsed.to_std().ok()?;
    let gap = wall_elapsed.saturating_sub(mono_elapsed);
    (gap > threshold).then_some(gap)
}

/// Report a background/foreground cycle.
pub fn signal_resume(visibility: &watch::Sender<Visibility>) {
    visibility.send_replace(Visibility::Hidden);
    visibility.send_replace(Visibility::Visible);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_gap_over_threshold_is_a_wake() {
        let gap = suspended_for(
            TimeDelta::seconds(125),
            Duration::from_secs(5),
            Duration::from_secs(15),
        );
        assert_eq!(gap, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_scheduler_jitter_is_not_a_wake() {
        assert_eq!(
            suspended_for(
                TimeDelta::milliseconds(5_300),
                Duration::from_secs(5),
                Duration::from_secs(15),
            ),
            None
        );
    }

    #[test]
    fn test_wall_clock_stepping_back_is_ignored() {
        assert_eq!(
            suspended_for(
                TimeDelta::seconds(-3600),
                Duration::from_secs(5),
                Duration::from_secs(15),
            ),
            None
        );
    }

    #[tokio::test]
    async fn test_resume_ends_visible_with_a_change() {
        let (tx, mut rx) = watch::channel(Visibility::Visible);
        rx.borrow_and_update();

        signal_resume(&tx);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Visibility::Visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_clock_reports_nothing() {
        let (tx, mut rx) = watch::channel(Visibility::Visible);
        rx.borrow_and_update();
        let cancel = CancellationToken::new();
        let task = WakeDetector::new(Duration::from_secs(1), Duration::from_secs(15))
            .spawn(tx, cancel.clone());

        // Paused time advances the monotonic clock only
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!rx.has_changed().unwrap());

        cancel.cancel();
        task.await.unwrap();
    }
}
