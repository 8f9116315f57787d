//! Shared test servers and helpers.

pub mod mock_rest;
pub mod mock_ws;

use std::time::Duration;

/// Poll `cond` every 10ms for up to 5 seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
