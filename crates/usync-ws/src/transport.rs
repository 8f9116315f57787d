//! Push channel transport.
//!
//! A `Connector` opens a `TransportLink`: a pair of channels plus a
//! cancellation token, backed by a task that owns the socket. The link task
//! performs the auth handshake, reports `Opened`, forwards updates and pongs,
//! and reports exactly one terminal event (`Closed` or `Error`) unless it was
//! cancelled locally.

use crate::error::{WsError, WsResult};
use crate::message::{PushUpdate, WsMessage, WsRequest};
use crate::ws_write_handle::WsWriteHandle;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use usync_core::Credentials;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Event reported by a transport link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket open and authenticated.
    Opened,
    /// Update pushed by the server.
    Update(PushUpdate),
    /// Reply to a liveness probe.
    Pong,
    /// Closed by the peer (terminal).
    Closed { code: u16, reason: String },
    /// Transport-level failure: connect, auth, or read error (terminal).
    Error(String),
}

impl TransportEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Error(_))
    }
}

/// Engine side of an open transport.
pub struct TransportLink {
    /// Events reported by the link task.
    pub events: mpsc::Receiver<TransportEvent>,
    /// Outbound message handle.
    pub writer: WsWriteHandle,
    /// Cancels the link task (closes the socket).
    pub cancel: CancellationToken,
}

/// Transport side of an open link, consumed by the task owning the socket.
pub struct LinkEnds {
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<String>,
    pub cancel: CancellationToken,
}

impl TransportLink {
    /// Create both ends of a link.
    pub fn channel(capacity: usize) -> (Self, LinkEnds) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let link = Self {
            events: event_rx,
            writer: WsWriteHandle::new(outbound_tx),
            cancel: cancel.clone(),
        };
        let ends = LinkEnds {
            events: event_tx,
            outbound: outbound_rx,
            cancel,
        };
        (link, ends)
    }
}

/// Opens push channel links.
pub trait Connector: Send + Sync {
    /// Open a link authenticated with `credentials`.
    ///
    /// Returns immediately; the handshake outcome arrives as the first event.
    /// Must be called from within a Tokio runtime.
    fn open(&self, credentials: &Credentials) -> TransportLink;
}

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct WsConnectorConfig {
    /// WebSocket URL.
    pub url: String,
    /// Time allowed between the upgrade and `authOk`.
    pub auth_timeout: Duration,
}

impl Default for WsConnectorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket connector (tokio-tungstenite).
pub struct WsConnector {
    config: WsConnectorConfig,
}

impl WsConnector {
    pub fn new(config: WsConnectorConfig) -> Self {
        Self { config }
    }
}

impl Connector for WsConnector {
    fn open(&self, credentials: &Credentials) -> TransportLink {
        let (link, ends) = TransportLink::channel(256);
        let config = self.config.clone();
        let token = credentials.token.clone();
        tokio::spawn(run_link(config, token, ends));
        link
    }
}

/// How a link ended without error.
enum LinkEnd {
    /// Cancelled or dropped by the engine; nothing to report.
    Local,
    /// Closed by the peer.
    Remote { code: u16, reason: String },
}

async fn run_link(config: WsConnectorConfig, token: String, ends: LinkEnds) {
    let LinkEnds {
        events,
        mut outbound,
        cancel,
    } = ends;

    let event = match drive(&config, &token, &events, &mut outbound, &cancel).await {
        Ok(LinkEnd::Local) => {
            debug!("Push channel closed locally");
            return;
        }
        Ok(LinkEnd::Remote { code, reason }) => {
            warn!(code, %reason, "Push channel closed by server");
            TransportEvent::Closed { code, reason }
        }
        Err(e) => {
            error!(error = %e, "Push channel error");
            TransportEvent::Error(e.to_string())
        }
    };

    if !cancel.is_cancelled() {
        let _ = events.send(event).await;
    }
}

async fn drive(
    config: &WsConnectorConfig,
    token: &str,
    events: &mpsc::Sender<TransportEvent>,
    outbound: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> WsResult<LinkEnd> {
    info!(url = %config.url, "Connecting to push channel");

    // TCP_NODELAY: probes and updates are tiny
    let connect = connect_async_tls_with_config(config.url.as_str(), None, true, None);
    let (ws_stream, _response) = tokio::select! {
        () = cancel.cancelled() => return Ok(LinkEnd::Local),
        result = connect => result?,
    };
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(WsRequest::auth(token).to_text()?))
        .await?;

    let handshake = tokio::time::timeout(config.auth_timeout, await_auth(&mut write, &mut read));
    tokio::select! {
        () = cancel.cancelled() => {
            let _ = write.send(Message::Close(None)).await;
            return Ok(LinkEnd::Local);
        }
        result = handshake => result.map_err(|_| WsError::AuthTimeout)??,
    }

    info!("Push channel authenticated");
    if events.send(TransportEvent::Opened).await.is_err() {
        return Ok(LinkEnd::Local);
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    warn!(?e, "Failed to send Close frame");
                }
                return Ok(LinkEnd::Local);
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = handle_text_message(&text)? {
                            if events.send(event).await.is_err() {
                                return Ok(LinkEnd::Local);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        return Ok(LinkEnd::Remote { code, reason });
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Ok(LinkEnd::Remote {
                            code: 1006,
                            reason: "Stream ended".to_string(),
                        });
                    }
                    _ => {}
                }
            }

            outbound_msg = outbound.recv() => {
                match outbound_msg {
                    Some(text) => write.send(Message::Text(text)).await?,
                    // Every write handle dropped: the engine let go of this link
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(LinkEnd::Local);
                    }
                }
            }
        }
    }
}

/// Read frames until the server accepts or rejects the auth request.
async fn await_auth(write: &mut WsSink, read: &mut WsSource) -> WsResult<()> {
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => match WsMessage::parse(&text) {
                Ok(WsMessage::AuthOk) => return Ok(()),
                Ok(WsMessage::AuthError { message }) => {
                    return Err(WsError::AuthRejected(
                        message.unwrap_or_else(|| "no reason given".to_string()),
                    ));
                }
                Ok(other) => debug!(?other, "Ignoring message before auth completed"),
                Err(e) => warn!(error = %e, "Discarding malformed frame during auth"),
            },
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            Message::Close(frame) => {
                let (code, reason) = frame
                    .map(|f| (f.code.into(), f.reason.to_string()))
                    .unwrap_or((1000, "Close during auth".to_string()));
                return Err(WsError::ConnectionClosed { code, reason });
            }
            _ => {}
        }
    }

    Err(WsError::ConnectionClosed {
        code: 1006,
        reason: "Stream ended during auth".to_string(),
    })
}

/// Map a text frame to a transport event.
///
/// Malformed frames are discarded (`Ok(None)`); a late auth rejection ends
/// the link.
fn handle_text_message(text: &str) -> WsResult<Option<TransportEvent>> {
    match WsMessage::parse(text) {
        Ok(WsMessage::Update(update)) => Ok(Some(TransportEvent::Update(update))),
        Ok(WsMessage::Pong) => Ok(Some(TransportEvent::Pong)),
        Ok(WsMessage::AuthOk) => {
            debug!("Duplicate authOk ignored");
            Ok(None)
        }
        Ok(WsMessage::AuthError { message }) => Err(WsError::AuthRejected(
            message.unwrap_or_else(|| "session revoked".to_string()),
        )),
        Err(e) => {
            warn!(error = %e, len = text.len(), "Discarding malformed push frame");
            Ok(None)
        }
    }
}
