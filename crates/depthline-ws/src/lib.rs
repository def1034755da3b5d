//! Streaming order book transport.
//!
//! Provides the push side of a depth feed:
//! - `StreamConnector`: opens one stream session and reports its events
//! - `TungsteniteConnector`: WebSocket implementation with an idle watchdog
//! - `StreamFrame`: classification of raw frames (heartbeat, book, other)
//! - `BackoffPolicy`: exponential reconnect delays with jitter
//! - `MockConnector`: scripted sessions for tests

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;
pub mod transport;

pub use connection::{BackoffPolicy, ConnectionConfig, TungsteniteConnector};
pub use error::{WsError, WsResult};
pub use heartbeat::{IdleWatchdog, WatchdogStats};
pub use message::{BookEnvelope, StreamFrame, DEFAULT_HEARTBEAT};
pub use subscription::StreamTarget;
pub use transport::{DynStreamConnector, MockConnector, MockStep, StreamConnector, TransportEvent};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` stream is opened.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
