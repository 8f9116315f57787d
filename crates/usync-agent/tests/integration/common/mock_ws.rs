//! Mock push channel server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Run the auth handshake (`auth` -> `authOk` / `authError`)
//! - Answer application-level pings
//! - Push update frames to every authenticated connection
//! - Drop every connection on demand
//! - Record received messages

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Command {
    Push(String),
    CloseAll,
}

#[derive(Clone)]
struct Shared {
    token: String,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<AtomicU32>,
    authenticated: Arc<AtomicU32>,
    commands: broadcast::Sender<Command>,
}

/// A mock push channel server.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Shared,
}

impl MockWsServer {
    /// Start a server accepting `token` on an available port.
    pub async fn start(token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (commands, _) = broadcast::channel(16);
        let shared = Shared {
            token: token.to_string(),
            messages: Arc::new(Mutex::new(VecDeque::new())),
            connections: Arc::new(AtomicU32::new(0)),
            authenticated: Arc::new(AtomicU32::new(0)),
            commands,
        };

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, accept_shared.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of accepted TCP connections.
    pub fn connection_count(&self) -> u32 {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Number of connections that completed the auth handshake.
    pub fn authenticated_count(&self) -> u32 {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Get all received text frames.
    pub async fn received_messages(&self) -> Vec<String> {
        self.shared.messages.lock().await.iter().cloned().collect()
    }

    /// Send an update frame to every authenticated connection.
    pub fn push(&self, update: serde_json::Value) {
        let mut frame = update;
        frame["type"] = serde_json::json!("update");
        let _ = self.shared.commands.send(Command::Push(frame.to_string()));
    }

    /// Close every open connection with a normal close frame.
    pub fn close_all(&self) {
        let _ = self.shared.commands.send(Command::CloseAll);
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        self.close_all();
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, shared: Shared) {
    shared.connections.fetch_add(1, Ordering::SeqCst);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let mut commands = shared.commands.subscribe();
    let mut authenticated = false;

    loop {
        tokio::select! {
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => continue,
                };
                shared.messages.lock().await.push_back(text.clone());

                let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                match parsed.get("type").and_then(|t| t.as_str()) {
                    Some("auth") if !authenticated => {
                        if parsed.get("token").and_then(|t| t.as_str()) == Some(shared.token.as_str()) {
                            authenticated = true;
                            shared.authenticated.fetch_add(1, Ordering::SeqCst);
                            let ok = serde_json::json!({"type": "authOk"});
                            let _ = write.send(Message::Text(ok.to_string())).await;
                        } else {
                            let rejected = serde_json::json!({
                                "type": "authError",
                                "message": "invalid token"
                            });
                            let _ = write.send(Message::Text(rejected.to_string())).await;
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some("ping") => {
                        let pong = serde_json::json!({"type": "pong"});
                        let _ = write.send(Message::Text(pong.to_string())).await;
                    }
                    _ => {}
                }
            }

            command = commands.recv() => {
                match command {
                    Ok(Command::Push(frame)) if authenticated => {
                        let _ = write.send(Message::Text(frame)).await;
                    }
                    Ok(Command::Push(_)) => {}
                    Ok(Command::CloseAll) | Err(_) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start("t").await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
