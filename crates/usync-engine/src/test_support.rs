//! Fakes shared by the engine's unit tests.

use crate::config::SyncConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use usync_core::{Credentials, FetchError, SnapshotSource, UserSnapshot};
use usync_ws::{Connector, LinkEnds, TransportLink};

/// Snapshot source answering from a script, then from a default.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<UserSnapshot, FetchError>>>,
    default: Mutex<Result<UserSnapshot, FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(default: Result<UserSnapshot, FetchError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<UserSnapshot, FetchError>) {
        self.script.lock().push_back(result);
    }

    pub fn set_default(&self, result: Result<UserSnapshot, FetchError>) {
        *self.default.lock() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self, _credentials: &Credentials) -> Result<UserSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default.lock().clone())
    }
}

/// Connector handing the transport side of every link to the test.
pub struct FakeConnector {
    opened: mpsc::UnboundedSender<LinkEnds>,
    links: tokio::sync::Mutex<mpsc::UnboundedReceiver<LinkEnds>>,
    opens: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        let (opened, links) = mpsc::unbounded_channel();
        Self {
            opened,
            links: tokio::sync::Mutex::new(links),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Transport side of the next opened link.
    pub async fn next_link(&self) -> LinkEnds {
        let mut links = self.links.lock().await;
        tokio::time::timeout(Duration::from_secs(2), links.recv())
            .await
            .expect("no link opened in time")
            .expect("connector dropped")
    }
}

impl Connector for FakeConnector {
    fn open(&self, _credentials: &Credentials) -> TransportLink {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (link, ends) = TransportLink::channel(16);
        let _ = self.opened.send(ends);
        link
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Millisecond timers for tests; reconnection is slow enough to observe.
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        heartbeat_interval_ms: 20,
        poll_interval_ms: 20,
        reconnect_base_delay_ms: 100,
        reconnect_max_delay_ms: 100,
        reconnect_jitter_ms: 0,
        reconnect_backoff: false,
        visibility_settle_ms: 10,
        auth_timeout_ms: 500,
        ..SyncConfig::default()
    }
}
