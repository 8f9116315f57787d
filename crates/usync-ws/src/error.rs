//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Authentication timed out")]
    AuthTimeout,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_frame_is_json_error() {
        let err: WsError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, WsError::Json(_)));
    }

    #[test]
    fn test_close_display_names_code() {
        let err = WsError::ConnectionClosed {
            code: 1008,
            reason: "policy".to_string(),
        };
        assert_eq!(err.to_string(), "Connection closed: code=1008, reason=policy");
    }
}
