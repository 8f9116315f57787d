//! Push channel connection manager.
//!
//! Owns the push channel of one session and the only writer of its
//! `ConnectionState`. Transport events drive a small state machine:
//! - `Opened`: poller off, reconnect timer cleared, `connected`, heartbeat on,
//!   initial snapshot requested
//! - `Closed` / `Error` / link dropped: heartbeat off, `disconnected` (or
//!   `error` if the channel never opened), poller on, one reconnect scheduled
//! - `Update`: converted to an `UpdateEvent` and handed to the dispatcher
//!
//! Each link gets a generation number; events from a link that has since been
//! replaced or torn down are ignored.

use crate::config::SyncConfig;
use crate::dispatcher::UpdateDispatcher;
use crate::poller::FallbackPoller;
use crate::reconnect::ReconnectScheduler;
use crate::refresh::{RefreshTrigger, SnapshotRefresher};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use usync_core::{ConnectionState, Credentials};
use usync_ws::{Connector, HeartbeatMonitor, TransportEvent, TransportLink, WsWriteHandle};

/// The link currently owned by the manager.
struct ActiveLink {
    generation: u64,
    writer: WsWriteHandle,
    cancel: CancellationToken,
}

/// Connection manager for one session.
pub struct ConnectionManager {
    credentials: Credentials,
    identity_field: String,
    connector: Arc<dyn Connector>,
    state_tx: watch::Sender<ConnectionState>,
    link: Mutex<Option<ActiveLink>>,
    generation: AtomicU64,
    heartbeat: Arc<HeartbeatMonitor>,
    poller: FallbackPoller,
    reconnect: ReconnectScheduler,
    refresher: Arc<SnapshotRefresher>,
    dispatcher: Arc<UpdateDispatcher>,
    /// Session token; every timer and link task ends with it.
    session: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        credentials: Credentials,
        connector: Arc<dyn Connector>,
        refresher: Arc<SnapshotRefresher>,
        dispatcher: Arc<UpdateDispatcher>,
        config: &SyncConfig,
        session: CancellationToken,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            credentials,
            identity_field: config.identity_field.clone(),
            connector,
            state_tx,
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
            heartbeat: Arc::new(HeartbeatMonitor::new(config.heartbeat_interval())),
            poller: FallbackPoller::new(
                Arc::clone(&refresher),
                config.poll_interval(),
                session.clone(),
            ),
            reconnect: ReconnectScheduler::new(config.reconnect_policy(), session.clone()),
            refresher,
            dispatcher,
            session,
        })
    }

    /// Open the push channel.
    ///
    /// No-op if this session already owns a link or has ended.
    pub fn start(self: &Arc<Self>) {
        if self.session.is_cancelled() {
            debug!("Session ended, not connecting");
            return;
        }

        let (generation, events, cancel) = {
            let mut slot = self.link.lock();
            if slot.is_some() {
                trace!("Push channel already owned by this session");
                return;
            }
            if !self.transition(ConnectionState::Connecting) {
                return;
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let TransportLink {
                events,
                writer,
                cancel,
            } = self.connector.open(&self.credentials);
            *slot = Some(ActiveLink {
                generation,
                writer,
                cancel: cancel.clone(),
            });
            (generation, events, cancel)
        };

        info!(generation, identity = %self.credentials.identity, "Connecting push channel");
        tokio::spawn(supervise(
            Arc::downgrade(self),
            generation,
            events,
            cancel,
            self.session.clone(),
        ));
    }

    /// Tear down the link and every timer, and reset to `disconnected`.
    ///
    /// Idempotent. Does not start the poller or schedule a reconnect.
    pub fn stop(&self) {
        if let Some(link) = self.link.lock().take() {
            link.cancel.cancel();
            debug!(generation = link.generation, "Push channel torn down");
        }
        self.heartbeat.stop();
        self.poller.stop();
        self.reconnect.cancel();

        self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                return false;
            }
            info!(from = %state, to = %ConnectionState::Disconnected, "Connection stopped");
            *state = ConnectionState::Disconnected;
            true
        });
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn poller(&self) -> &FallbackPoller {
        &self.poller
    }

    pub fn reconnect(&self) -> &ReconnectScheduler {
        &self.reconnect
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_open(generation),
            TransportEvent::Update(update) => {
                if !self.is_current(generation) {
                    return;
                }
                let event =
                    update.into_event(&self.identity_field, &self.credentials.identity, Utc::now());
                let outcome = self.dispatcher.dispatch(event);
                trace!(?outcome, "Push update handled");
            }
            TransportEvent::Pong => self.heartbeat.record_pong(),
            TransportEvent::Closed { code, reason } => {
                self.on_down(generation, &format!("closed ({code}): {reason}"));
            }
            TransportEvent::Error(message) => self.on_down(generation, &message),
        }
    }

    fn on_open(self: &Arc<Self>, generation: u64) {
        let writer = match self.link.lock().as_ref() {
            Some(link) if link.generation == generation => link.writer.clone(),
            _ => return,
        };

        // The poller must be off before anyone can observe `connected`
        self.poller.stop();
        self.reconnect.cancel();
        self.reconnect.reset_attempts();
        if !self.transition(ConnectionState::Connected) {
            return;
        }
        self.heartbeat.start(writer, &self.session);

        let refresher = Arc::clone(&self.refresher);
        let session = self.session.clone();
        tokio::spawn(async move {
            refresher
                .refresh_until(RefreshTrigger::Initial, &session)
                .await;
        });
    }

    fn on_down(self: &Arc<Self>, generation: u64, reason: &str) {
        {
            let mut slot = self.link.lock();
            if !slot.as_ref().is_some_and(|link| link.generation == generation) {
                return;
            }
            if let Some(link) = slot.take() {
                link.cancel.cancel();
            }
        }
        self.heartbeat.stop();

        let next = match self.state() {
            ConnectionState::Connecting => ConnectionState::Error,
            _ => ConnectionState::Disconnected,
        };
        warn!(generation, %reason, state = %next, "Push channel down");
        self.transition(next);

        if self.session.is_cancelled() {
            return;
        }
        self.poller.start();

        let manager = Arc::downgrade(self);
        self.reconnect.schedule(move || {
            if let Some(manager) = manager.upgrade() {
                manager.reconnect_now();
            }
        });
    }

    fn reconnect_now(self: &Arc<Self>) {
        if self.session.is_cancelled() || self.state() == ConnectionState::Connected {
            return;
        }
        debug!("Reconnect timer fired");
        self.start();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link
            .lock()
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    /// Apply a transition from the table; invalid ones are logged and skipped.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut applied = false;
        self.state_tx.send_if_modified(|state| match state.transition(next) {
            Ok(next) => {
                info!(from = %state, to = %next, "Connection state changed");
                *state = next;
                applied = true;
                true
            }
            Err(e) => {
                warn!(error = %e, "Ignoring connection state change");
                false
            }
        });
        applied
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.cancel.cancel();
        }
    }
}

/// Route one link's events to the manager until the link ends.
async fn supervise(
    manager: Weak<ConnectionManager>,
    generation: u64,
    mut events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
    session: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            () = session.cancelled() => {
                cancel.cancel();
                break;
            }
            event = events.recv() => event,
        };

        let Some(manager) = manager.upgrade() else {
            cancel.cancel();
            break;
        };
        match event {
            Some(event) => {
                let terminal = event.is_terminal();
                manager.handle_event(generation, event);
                if terminal {
                    break;
                }
            }
            None => {
                manager.on_down(generation, "transport dropped");
                break;
            }
        }
    }
    trace!(generation, "Link supervisor exited");
}
