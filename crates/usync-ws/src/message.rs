//! WebSocket message types.
//!
//! Every frame is a JSON text frame tagged by `type`.

use crate::error::WsResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use usync_core::{Fields, UpdateEvent, UpdateKind, UpdatePayload, UpdateSource, UserSnapshot};

// ============================================================================
// Outgoing
// ============================================================================

/// Outgoing request to the push channel.
#[derive(Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsRequest {
    /// Auth-on-connect, sent right after the upgrade.
    Auth { token: String },
    /// Liveness probe.
    Ping,
}

impl WsRequest {
    /// Create a ping request.
    pub fn ping() -> Self {
        Self::Ping
    }

    /// Create an auth request.
    pub fn auth(token: impl Into<String>) -> Self {
        Self::Auth {
            token: token.into(),
        }
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl std::fmt::Debug for WsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth { .. } => write!(f, "Auth {{ token: <redacted> }}"),
            Self::Ping => write!(f, "Ping"),
        }
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Incoming push channel message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsMessage {
    /// Auth handshake accepted.
    AuthOk,
    /// Auth handshake rejected.
    AuthError {
        #[serde(default)]
        message: Option<String>,
    },
    /// Reply to a ping.
    Pong,
    /// Snapshot update for the signed-in account.
    Update(PushUpdate),
}

impl WsMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> WsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Update pushed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushUpdate {
    pub kind: UpdateKind,
    #[serde(default)]
    pub snapshot: Option<Fields>,
    /// Server-assigned emission time. Assigned at receipt when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PushUpdate {
    /// Convert into an `UpdateEvent` with `source=push`.
    ///
    /// `snapshot-refresh` payloads become full snapshots, every other kind a
    /// partial one. The identity member is lifted out of the field set; a full
    /// snapshot without one is attributed to `session_identity`.
    pub fn into_event(
        self,
        identity_field: &str,
        session_identity: &str,
        received_at: DateTime<Utc>,
    ) -> UpdateEvent {
        let timestamp = self.timestamp.unwrap_or(received_at);
        let payload = self.snapshot.map(|mut fields| {
            let identity = fields
                .remove(identity_field)
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| session_identity.to_string());

            if self.kind.carries_full_snapshot() {
                UpdatePayload::Full(UserSnapshot {
                    identity,
                    fields,
                    last_timestamp: None,
                })
            } else {
                UpdatePayload::Partial(fields)
            }
        });

        UpdateEvent {
            kind: self.kind,
            payload,
            timestamp,
            source: UpdateSource::Push,
            message: self.message,
        }
    }
}
