//! WebSocket write handle for sending messages.
//!
//! Fire-and-forget sending over the link's outbound channel. The handle
//! outlives nothing: once the link task exits the channel closes and every
//! send fails with `SendFailed`.

use crate::error::{WsError, WsResult};
use crate::message::WsRequest;
use tokio::sync::mpsc;
use tracing::debug;

/// Write handle for sending messages to one transport link.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<String>,
}

impl WsWriteHandle {
    /// Create a new write handle.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queue a request for sending.
    ///
    /// # Errors
    ///
    /// - `WsError::Json`: the request could not be serialized
    /// - `WsError::SendFailed`: the link is closed
    pub async fn send(&self, request: &WsRequest) -> WsResult<()> {
        let text = request.to_text()?;
        self.tx
            .send(text)
            .await
            .map_err(|_| WsError::SendFailed("channel closed".to_string()))?;
        debug!(?request, "Request queued for sending");
        Ok(())
    }

    /// Send a liveness probe.
    pub async fn ping(&self) -> WsResult<()> {
        self.send(&WsRequest::ping()).await
    }

    /// Check if the underlying channel is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_queued() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = WsWriteHandle::new(tx);

        handle.ping().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"ping"}"#);
    }

    #[tokio::test]
    async fn test_send_fails_when_closed() {
        let (tx, rx) = mpsc::channel(8);
        let handle = WsWriteHandle::new(tx);
        drop(rx);

        assert!(handle.is_closed());
        let result = handle.ping().await;
        assert!(matches!(result, Err(WsError::SendFailed(_))));
    }
}
