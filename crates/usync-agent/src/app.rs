//! Main application orchestration.
//!
//! Coordinates:
//! - Push channel connector and REST snapshot client
//! - Storage, in memory or in a file owned by this process
//! - Suspend detection feeding the visibility refresher
//! - Session lifecycle driven by the credentials signal
//! - Notification logging

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::wake::WakeDetector;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use usync_core::{Credentials, Notification};
use usync_engine::{LocalStorage, SyncAgent, SyncDeps, TabId, TabStorage, Visibility};
use usync_rest::ProfileClient;
use usync_ws::{WsConnector, WsConnectorConfig};

/// Main application.
pub struct Application {
    config: AppConfig,
    agent: Arc<SyncAgent>,
    tab: TabId,
    auth_tx: watch::Sender<Option<Credentials>>,
    visibility_tx: watch::Sender<Visibility>,
}

impl Application {
    /// Create a new application. No connection is opened until `run`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        usync_ws::init_crypto();

        let connector = Arc::new(WsConnector::new(WsConnectorConfig {
            url: config.ws_url.clone(),
            auth_timeout: config.sync.auth_timeout(),
        }));
        let source = Arc::new(ProfileClient::with_timeout(
            config.profile_url.clone(),
            config.sync.identity_field.clone(),
            config.request_timeout(),
        )?);
        let storage: Arc<dyn TabStorage> = match &config.storage_path {
            Some(path) => {
                info!(path = %path.display(), "Using storage file");
                Arc::new(LocalStorage::open(path)?)
            }
            None => Arc::new(LocalStorage::in_memory()),
        };

        let tab = TabId::new();
        let (visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
        let (auth_tx, _) = watch::channel(None);

        let deps = SyncDeps {
            connector,
            source,
            storage,
            tab,
            visibility: visibility_rx,
        };
        let agent = Arc::new(SyncAgent::new(deps, config.sync.clone()));

        Ok(Self {
            config,
            agent,
            tab,
            auth_tx,
            visibility_tx,
        })
    }

    pub fn agent(&self) -> &Arc<SyncAgent> {
        &self.agent
    }

    /// Sender of the "current credentials" signal. `None` logs out.
    pub fn auth(&self) -> watch::Sender<Option<Credentials>> {
        self.auth_tx.clone()
    }

    /// Report a background/foreground cycle, as the wake detector does.
    pub fn resume(&self) {
        crate::wake::signal_resume(&self.visibility_tx);
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The running session is shut down on exit; its cached snapshot stays
    /// in storage for the next start.
    pub async fn run_until(
        &self,
        initial: Option<Credentials>,
        shutdown: CancellationToken,
    ) -> AppResult<()> {
        info!(tab = %self.tab, ws_url = %self.config.ws_url, "Sync agent starting");

        let background = shutdown.child_token();
        let wake = WakeDetector::new(
            self.config.wake_check_interval(),
            self.config.wake_threshold(),
        )
        .spawn(self.visibility_tx.clone(), background.clone());
        let sink = spawn_notification_log(self.agent.notifications(), background.clone());

        self.auth_tx.send_replace(initial);
        let auth_rx = self.auth_tx.subscribe();

        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown requested");
            }
            () = self.agent.run(auth_rx) => {
                warn!("Authentication signal closed");
            }
        }

        self.agent.shutdown();
        background.cancel();
        join_quietly(wake).await;
        join_quietly(sink).await;
        info!("Sync agent stopped");
        Ok(())
    }

    /// Run until Ctrl+C.
    pub async fn run(&self, initial: Option<Credentials>) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let signal = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                shutdown.cancel();
            })
        };

        let result = self.run_until(initial, shutdown).await;
        signal.abort();
        result
    }
}

/// Log every user-facing notification.
fn spawn_notification_log(
    mut notifications: broadcast::Receiver<Notification>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = notifications.recv() => received,
            };
            match received {
                Ok(Notification::RefreshFailed { message }) => {
                    warn!(%message, "Snapshot refresh failed");
                }
                Ok(notification) => info!(?notification, "User notification"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn join_quietly(task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if !e.is_cancelled() {
            warn!(error = %e, "Background task failed");
        }
    }
}
