//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use usync_core::Credentials;
use usync_engine::SyncConfig;
use usync_telemetry::LoggingConfig;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "USYNC_CONFIG";
/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "USYNC_TOKEN";
/// Environment variable holding the identity key.
pub const IDENTITY_ENV: &str = "USYNC_IDENTITY";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Push channel URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Snapshot endpoint URL.
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
    /// REST request timeout (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// File holding the cached snapshot across restarts. In-memory when unset.
    /// One agent process per file: the file is read at start and rewritten
    /// whole on every change.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// How often the suspend detector samples the clocks (ms).
    #[serde(default = "default_wake_check_interval_ms")]
    pub wake_check_interval_ms: u64,
    /// Clock drift treated as a suspend/resume cycle (ms).
    #[serde(default = "default_wake_threshold_ms")]
    pub wake_threshold_ms: u64,
    /// Sync engine settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging settings.
    #[serde(default)]
    pub telemetry: LoggingConfig,
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_profile_url() -> String {
    "http://127.0.0.1:8080/api/profile".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_wake_check_interval_ms() -> u64 {
    5_000
}

fn default_wake_threshold_ms() -> u64 {
    15_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            profile_url: default_profile_url(),
            request_timeout_ms: default_request_timeout_ms(),
            storage_path: None,
            wake_check_interval_ms: default_wake_check_interval_ms(),
            wake_threshold_ms: default_wake_threshold_ms(),
            sync: SyncConfig::default(),
            telemetry: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve the config path (explicit > `USYNC_CONFIG` > default) and load it.
    ///
    /// A missing file at the default location falls back to defaults; an
    /// explicitly named file must exist.
    pub fn load(explicit: Option<&str>) -> AppResult<Self> {
        let named = explicit
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok());

        match named {
            Some(path) => Self::from_file(&path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)
            }
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "ws_url must use ws:// or wss://, got {}",
                self.ws_url
            )));
        }
        if !(self.profile_url.starts_with("http://") || self.profile_url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "profile_url must use http:// or https://, got {}",
                self.profile_url
            )));
        }

        let timers = [
            ("sync.heartbeat_interval_ms", self.sync.heartbeat_interval_ms),
            ("sync.poll_interval_ms", self.sync.poll_interval_ms),
            ("sync.reconnect_base_delay_ms", self.sync.reconnect_base_delay_ms),
            ("sync.auth_timeout_ms", self.sync.auth_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("wake_check_interval_ms", self.wake_check_interval_ms),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, ms)| *ms == 0) {
            return Err(AppError::Config(format!("{name} must be greater than zero")));
        }
        if self.sync.storage_key.is_empty() {
            return Err(AppError::Config("sync.storage_key must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn wake_check_interval(&self) -> Duration {
        Duration::from_millis(self.wake_check_interval_ms)
    }

    pub fn wake_threshold(&self) -> Duration {
        Duration::from_millis(self.wake_threshold_ms)
    }
}

/// Credentials from `USYNC_IDENTITY` / `USYNC_TOKEN`.
///
/// Both unset means "start logged out"; exactly one set is an error.
pub fn credentials_from_env() -> AppResult<Option<Credentials>> {
    credentials_from(
        std::env::var(IDENTITY_ENV).ok(),
        std::env::var(TOKEN_ENV).ok(),
    )
}

fn credentials_from(
    identity: Option<String>,
    token: Option<String>,
) -> AppResult<Option<Credentials>> {
    let identity = identity.filter(|v| !v.is_empty());
    let token = token.filter(|v| !v.is_empty());
    match (identity, token) {
        (Some(identity), Some(token)) => Ok(Some(Credentials::new(identity, token))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(AppError::MissingCredentials(TOKEN_ENV)),
        (None, Some(_)) => Err(AppError::MissingCredentials(IDENTITY_ENV)),
    }
}
