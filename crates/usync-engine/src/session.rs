//! Session handle.
//!
//! Everything that runs on behalf of one authenticated session: the push
//! channel, heartbeat, poller, reconnect timer, cross-tab listener and
//! visibility refresher. All of them hang off one cancellation token, so
//! ending the session ends every timer and socket it created.

use crate::config::SyncConfig;
use crate::connection::ConnectionManager;
use crate::cross_tab;
use crate::dispatcher::UpdateDispatcher;
use crate::error::{SyncError, SyncResult};
use crate::refresh::{RefreshOutcome, RefreshTrigger, SnapshotRefresher};
use crate::storage::{TabId, TabStorage};
use crate::visibility::{self, Visibility};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use usync_core::{ConnectionState, Credentials, Notification, SnapshotSource, UserSnapshot};
use usync_ws::Connector;
use uuid::Uuid;

/// Collaborators shared by every session of one tab.
#[derive(Clone)]
pub struct SyncDeps {
    pub connector: Arc<dyn Connector>,
    pub source: Arc<dyn SnapshotSource>,
    pub storage: Arc<dyn TabStorage>,
    pub tab: TabId,
    pub visibility: watch::Receiver<Visibility>,
}

/// A running session.
pub struct SessionHandle {
    id: Uuid,
    credentials: Credentials,
    cancel: CancellationToken,
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<UpdateDispatcher>,
    refresher: Arc<SnapshotRefresher>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionHandle {
    /// Start a session: adopt the stored snapshot, start listening to other
    /// tabs and to visibility changes, and open the push channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(credentials: Credentials, deps: &SyncDeps, config: &SyncConfig) -> Self {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let dispatcher = Arc::new(UpdateDispatcher::new(
            credentials.identity.clone(),
            deps.tab,
            config.storage_key.clone(),
            Arc::clone(&deps.storage),
            config.notifications.clone(),
        ));
        let warm = dispatcher.warm_start();

        let refresher = Arc::new(SnapshotRefresher::new(
            Arc::clone(&deps.source),
            Arc::clone(&dispatcher),
            credentials.clone(),
        ));
        let connection = ConnectionManager::new(
            credentials.clone(),
            Arc::clone(&deps.connector),
            Arc::clone(&refresher),
            Arc::clone(&dispatcher),
            config,
            cancel.clone(),
        );

        let tasks = vec![
            cross_tab::spawn(
                deps.tab,
                config.storage_key.clone(),
                Arc::clone(&deps.storage),
                Arc::clone(&dispatcher),
                cancel.clone(),
            ),
            visibility::spawn(
                deps.visibility.clone(),
                Arc::clone(&refresher),
                config.visibility_settle(),
                cancel.clone(),
            ),
        ];

        connection.start();
        info!(session = %id, identity = %credentials.identity, warm, tab = %deps.tab, "Session started");

        Self {
            id,
            credentials,
            cancel,
            connection,
            dispatcher,
            refresher,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Token cancelled when this session shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    pub fn snapshot(&self) -> Option<UserSnapshot> {
        self.dispatcher.current()
    }

    pub fn snapshot_watch(&self) -> watch::Receiver<Option<UserSnapshot>> {
        self.dispatcher.snapshot_watch()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.dispatcher.subscribe_notifications()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Arc<UpdateDispatcher> {
        &self.dispatcher
    }

    /// User-triggered fetch-and-compare. Failures are also published as
    /// `Notification::RefreshFailed`.
    pub async fn refresh_now(&self) -> SyncResult<RefreshOutcome> {
        self.refresher
            .refresh_until(RefreshTrigger::User, &self.cancel)
            .await
            .unwrap_or(Err(SyncError::SessionEnded))
    }

    /// Stop every timer, socket and listener of this session. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.connection.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(session = %self.id, identity = %self.credentials.identity, "Session shut down");
    }

    /// Shut down and drop the cached snapshot (logout).
    pub fn end(&self) {
        self.shutdown();
        self.dispatcher.clear();
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use crate::test_support::{fast_config, wait_until, FakeConnector, ScriptedSource};
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::time::Duration;
    use usync_core::{FetchError, Fields, UpdateKind};
    use usync_ws::{PushUpdate, TransportEvent};

    struct Tab {
        deps: SyncDeps,
        connector: Arc<FakeConnector>,
        source: Arc<ScriptedSource>,
        visibility: watch::Sender<Visibility>,
    }

    fn open_tab(storage: &Arc<LocalStorage>) -> Tab {
        let connector = Arc::new(FakeConnector::new());
        let source = Arc::new(ScriptedSource::new(Ok(
            UserSnapshot::new("u-1").with_field("verified", false)
        )));
        let (visibility, visibility_rx) = watch::channel(Visibility::Visible);
        let deps = SyncDeps {
            connector: Arc::clone(&connector) as _,
            source: Arc::clone(&source) as _,
            storage: Arc::clone(storage) as _,
            tab: TabId::new(),
            visibility: visibility_rx,
        };
        Tab {
            deps,
            connector,
            source,
            visibility,
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("u-1", "token")
    }

    fn push(field: &str, value: serde_json::Value, timestamp: DateTime<Utc>) -> TransportEvent {
        let mut fields = Fields::new();
        fields.insert(field.to_string(), value);
        TransportEvent::Update(PushUpdate {
            kind: UpdateKind::VerificationChanged,
            snapshot: Some(fields),
            timestamp: Some(timestamp),
            message: None,
        })
    }

    fn later(secs: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_verification_push_then_silent_poll() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        let config = SyncConfig {
            reconnect_base_delay_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
            ..fast_config()
        };
        let session = SessionHandle::start(credentials(), &tab.deps, &config);
        let mut notes = session.notifications();

        let ends = tab.connector.next_link().await;
        ends.events.send(TransportEvent::Opened).await.unwrap();
        assert!(wait_until(|| session.snapshot().is_some()).await);

        // Push at T1: verification completes
        ends.events
            .send(push("verified", json!(true), later(1)))
            .await
            .unwrap();
        assert!(wait_until(|| session.snapshot().is_some_and(|s| s.is_flag_set("verified"))).await);
        assert!(matches!(
            notes.try_recv().unwrap(),
            Notification::VerificationCompleted { .. }
        ));

        // Channel drops; poller ticks see the same data
        tab.source
            .set_default(Ok(UserSnapshot::new("u-1").with_field("verified", true)));
        let calls = tab.source.calls();
        ends.events
            .send(TransportEvent::Closed {
                code: 1006,
                reason: "abnormal".to_string(),
            })
            .await
            .unwrap();
        assert!(wait_until(|| session.connection_state() == ConnectionState::Disconnected).await);
        assert!(wait_until(|| tab.source.calls() >= calls + 2).await);

        assert!(notes.try_recv().is_err());
        assert!(session.snapshot().unwrap().is_flag_set("verified"));
    }

    #[tokio::test]
    async fn test_stale_push_after_poll_is_discarded() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        tab.source.set_default(Ok(
            UserSnapshot::new("u-1").with_field("verified", true)
        ));
        let session = SessionHandle::start(credentials(), &tab.deps, &fast_config());

        // First link fails; the poller fetches the authoritative snapshot
        let first = tab.connector.next_link().await;
        first
            .events
            .send(TransportEvent::Error("refused".to_string()))
            .await
            .unwrap();
        assert!(wait_until(|| session.snapshot().is_some_and(|s| s.is_flag_set("verified"))).await);
        let polled_at = session.dispatcher().last_timestamp().unwrap();

        // Reconnected channel delivers an old event
        let second = tab.connector.next_link().await;
        second.events.send(TransportEvent::Opened).await.unwrap();
        second
            .events
            .send(push(
                "verified",
                json!(false),
                "2000-01-01T00:00:00Z".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert!(wait_until(|| session.connection_state() == ConnectionState::Connected).await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let snapshot = session.snapshot().unwrap();
        assert!(snapshot.is_flag_set("verified"));
        assert!(snapshot.last_timestamp.unwrap() >= polled_at);
    }

    #[tokio::test]
    async fn test_foreground_refreshes_while_connected() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        let session = SessionHandle::start(credentials(), &tab.deps, &fast_config());
        let ends = tab.connector.next_link().await;
        ends.events.send(TransportEvent::Opened).await.unwrap();
        assert!(wait_until(|| session.snapshot().is_some()).await);
        let calls = tab.source.calls();

        tab.visibility.send(Visibility::Hidden).unwrap();
        tab.visibility.send(Visibility::Visible).unwrap();

        assert!(wait_until(|| tab.source.calls() == calls + 1).await);
        assert_eq!(session.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_foreground_refreshes_while_polling() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        let config = SyncConfig {
            poll_interval_ms: 60_000,
            reconnect_base_delay_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
            ..fast_config()
        };
        let session = SessionHandle::start(credentials(), &tab.deps, &config);
        let ends = tab.connector.next_link().await;
        ends.events
            .send(TransportEvent::Error("refused".to_string()))
            .await
            .unwrap();
        assert!(wait_until(|| session.connection_state() == ConnectionState::Error).await);
        assert!(wait_until(|| session.connection().poller().is_active()).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let calls = tab.source.calls();

        tab.source
            .set_default(Ok(UserSnapshot::new("u-1").with_field("verified", true)));
        tab.visibility.send(Visibility::Hidden).unwrap();
        tab.visibility.send(Visibility::Visible).unwrap();

        assert!(wait_until(|| session.snapshot().is_some_and(|s| s.is_flag_set("verified"))).await);
        assert_eq!(tab.source.calls(), calls + 1);
        assert_eq!(session.connection_state(), ConnectionState::Error);
        assert!(session.connection().poller().is_active());
    }

    #[tokio::test]
    async fn test_tabs_converge_without_network() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab_a = open_tab(&storage);
        let tab_b = open_tab(&storage);
        let a = SessionHandle::start(credentials(), &tab_a.deps, &fast_config());
        let b = SessionHandle::start(credentials(), &tab_b.deps, &fast_config());

        let ends = tab_a.connector.next_link().await;
        ends.events.send(TransportEvent::Opened).await.unwrap();
        ends.events
            .send(push("verified", json!(true), later(1)))
            .await
            .unwrap();

        assert!(wait_until(|| b.snapshot().is_some_and(|s| s.is_flag_set("verified"))).await);
        assert_eq!(tab_b.source.calls(), 0);
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[tokio::test]
    async fn test_warm_start_from_storage() {
        let storage = Arc::new(LocalStorage::in_memory());
        let stored = UserSnapshot::new("u-1")
            .with_field("status", "approved")
            .at(later(0));
        storage
            .set(TabId::new(), "usync:user", &stored.to_json().unwrap())
            .unwrap();
        let tab = open_tab(&storage);

        let session = SessionHandle::start(credentials(), &tab.deps, &fast_config());

        assert_eq!(session.snapshot(), Some(stored));
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        let session = SessionHandle::start(credentials(), &tab.deps, &fast_config());
        let ends = tab.connector.next_link().await;
        ends.events
            .send(TransportEvent::Error("refused".to_string()))
            .await
            .unwrap();
        assert!(wait_until(|| session.connection().poller().is_active()).await);

        session.shutdown();
        session.shutdown();

        assert!(!session.is_active());
        assert!(ends.cancel.is_cancelled());
        assert!(!session.connection().poller().is_active());
        assert!(!session.connection().reconnect().is_pending());
        let calls = tab.source.calls();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(tab.source.calls(), calls);
        assert_eq!(tab.connector.opens(), 1);
        assert!(matches!(
            session.refresh_now().await,
            Err(SyncError::SessionEnded)
        ));
    }

    #[tokio::test]
    async fn test_refresh_now_surfaces_failure() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        let session = SessionHandle::start(credentials(), &tab.deps, &fast_config());
        let mut notes = session.notifications();
        tab.source
            .push(Err(FetchError::Http("offline".to_string())));

        let result = session.refresh_now().await;

        assert!(matches!(result, Err(SyncError::Fetch(_))));
        assert!(matches!(
            notes.try_recv().unwrap(),
            Notification::RefreshFailed { .. }
        ));
        tokio_test::assert_ok!(session.refresh_now().await);
    }

    #[tokio::test]
    async fn test_end_clears_storage() {
        let storage = Arc::new(LocalStorage::in_memory());
        let tab = open_tab(&storage);
        let session = SessionHandle::start(credentials(), &tab.deps, &fast_config());
        tokio_test::assert_ok!(session.refresh_now().await);
        assert!(storage.get("usync:user").unwrap().is_some());

        session.end();

        assert!(storage.get("usync:user").unwrap().is_none());
        assert!(session.snapshot().is_none());
    }
}
