//! Session lifecycle supervisor.
//!
//! Follows the authentication collaborator's "current credentials" signal:
//! a new login starts a session, a different login replaces it, a logout
//! ends it. At most one session is alive at any time, and a replaced session
//! is fully shut down before its successor starts. Notifications of every
//! session are forwarded to one agent-level channel.

use crate::config::SyncConfig;
use crate::session::{SessionHandle, SyncDeps};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use usync_core::{Credentials, Notification};

/// Runs one session at a time for a tab.
pub struct SyncAgent {
    deps: SyncDeps,
    config: SyncConfig,
    session: Mutex<Option<Arc<SessionHandle>>>,
    notify_tx: broadcast::Sender<Notification>,
}

impl SyncAgent {
    pub fn new(deps: SyncDeps, config: SyncConfig) -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            deps,
            config,
            session: Mutex::new(None),
            notify_tx,
        }
    }

    /// Apply an authentication change.
    ///
    /// `Some` with the credentials of the running session is a no-op.
    pub fn handle(&self, credentials: Option<Credentials>) {
        let mut slot = self.session.lock();
        match credentials {
            Some(credentials) => {
                if slot
                    .as_ref()
                    .is_some_and(|s| s.is_active() && *s.credentials() == credentials)
                {
                    debug!(identity = %credentials.identity, "Session unchanged");
                    return;
                }
                if let Some(previous) = slot.take() {
                    info!(
                        from = %previous.credentials().identity,
                        to = %credentials.identity,
                        "Session replaced"
                    );
                    previous.shutdown();
                }
                let session = SessionHandle::start(credentials, &self.deps, &self.config);
                self.forward_notifications(&session);
                *slot = Some(Arc::new(session));
            }
            None => {
                if let Some(previous) = slot.take() {
                    info!(identity = %previous.credentials().identity, "Logged out");
                    previous.end();
                }
            }
        }
    }

    /// Follow `auth` until its sender is dropped.
    ///
    /// The value present at call time is applied first.
    pub async fn run(&self, mut auth: watch::Receiver<Option<Credentials>>) {
        let initial = auth.borrow_and_update().clone();
        self.handle(initial);

        while auth.changed().await.is_ok() {
            let credentials = auth.borrow_and_update().clone();
            self.handle(credentials);
        }
        debug!("Authentication signal closed");
    }

    /// Shut down the running session, keeping its cached snapshot.
    pub fn shutdown(&self) {
        if let Some(session) = self.session.lock().take() {
            session.shutdown();
        }
    }

    pub fn session(&self) -> Option<Arc<SessionHandle>> {
        self.session.lock().clone()
    }

    /// Notifications of the current and every later session.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    fn forward_notifications(&self, session: &SessionHandle) {
        let mut rx = session.notifications();
        let tx = self.notify_tx.clone();
        let done = session.cancellation();
        tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    () = done.cancelled() => break,
                    received = rx.recv() => received,
                };
                match notification {
                    Ok(notification) => {
                        let _ = tx.send(notification);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
