//! Push channel transport for user snapshot synchronization.
//!
//! Provides the WebSocket side of the sync engine:
//! - Auth-on-connect handshake (`auth` -> `authOk`)
//! - Channel-based event routing (`TransportEvent`) decoupled from the socket
//! - Heartbeat probes over the outbound channel
//! - A `Connector` port so the engine can be driven by fake transports in tests

pub mod error;
pub mod heartbeat;
pub mod message;
pub mod transport;
pub mod ws_write_handle;

pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatMonitor, HeartbeatStats};
pub use message::{PushUpdate, WsMessage, WsRequest};
pub use transport::{
    Connector, LinkEnds, TransportEvent, TransportLink, WsConnector, WsConnectorConfig,
};
pub use ws_write_handle::WsWriteHandle;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket or HTTPS connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
