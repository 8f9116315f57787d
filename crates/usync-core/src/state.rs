//! Push channel connection state.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Connection state of the push channel.
///
/// Owned and mutated only by the connection manager. The transport-driven
/// transitions are:
///
/// ```text
/// connecting   -> connected | error
/// connected    -> disconnected
/// disconnected -> connecting
/// error        -> connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    /// Check the transition table.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Error)
                | (Self::Connected, Self::Disconnected)
                | (Self::Disconnected, Self::Connecting)
                | (Self::Error, Self::Connecting)
        )
    }

    /// Validate a transition, returning the next state.
    pub fn transition(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Whether the fallback data sources should be active in this state.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}
