//! Sync engine configuration.

use crate::reconnect::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use usync_core::NotificationPolicy;

/// Timers, storage slot and notification settings of a sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Liveness probe interval while connected (ms). Default: 30,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// REST poll interval while the push channel is down (ms). Default: 10,000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// First reconnection delay (ms). Default: 5,000.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Reconnection delay cap (ms). Default: 60,000.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay (ms). Default: 1,000.
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,
    /// Double the delay on each consecutive failure. Default: true.
    /// When false every attempt waits `reconnect_base_delay_ms` (+ jitter).
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: bool,
    /// Delay between regaining the foreground and refreshing (ms). Default: 1,000.
    #[serde(default = "default_visibility_settle_ms")]
    pub visibility_settle_ms: u64,
    /// Time allowed for the push channel auth handshake (ms). Default: 10,000.
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    /// Storage key of the serialized snapshot.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Snapshot member carrying the identity key.
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    /// Notification classification.
    #[serde(default)]
    pub notifications: NotificationPolicy,
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_reconnect_jitter_ms() -> u64 {
    1_000
}

fn default_reconnect_backoff() -> bool {
    true
}

fn default_visibility_settle_ms() -> u64 {
    1_000
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_storage_key() -> String {
    "usync:user".to_string()
}

fn default_identity_field() -> String {
    "id".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            reconnect_backoff: default_reconnect_backoff(),
            visibility_settle_ms: default_visibility_settle_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            storage_key: default_storage_key(),
            identity_field: default_identity_field(),
            notifications: NotificationPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_settle(&self) -> Duration {
        Duration::from_millis(self.visibility_settle_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Reconnection policy derived from the `reconnect_*` settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.reconnect_base_delay_ms,
            max_delay_ms: self.reconnect_max_delay_ms,
            jitter_ms: self.reconnect_jitter_ms,
            backoff: self.reconnect_backoff,
        }
    }
}
