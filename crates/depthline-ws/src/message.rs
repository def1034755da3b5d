//! Stream frame classification.
//!
//! The server sends two kinds of text frames: a bare `heartbeat` sentinel and
//! JSON documents. A book update looks like:
//!
//! ```json
//! {"book": {"exchange": "KRAKEN", "symbol": "BTC-USD",
//!           "book": {"bid": {"100.5": 1.2}, "ask": {"101": 0.4}}}}
//! ```
//!
//! Other JSON documents (trades, tickers) share the socket and are ignored.

use crate::error::WsError;
use depthline_core::{RawBookPayload, RawDelta, Subscription};
use serde::Deserialize;

/// Heartbeat sentinel sent by the streaming server.
pub const DEFAULT_HEARTBEAT: &str = "heartbeat";

/// Book update as carried in the outer `book` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookEnvelope {
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    /// Server-side timestamp (ms), when present.
    #[serde(default)]
    pub timestamp: Option<f64>,
    pub book: RawDelta,
}

impl BookEnvelope {
    /// Check if this update names the given subscription.
    ///
    /// The symbol is mandatory; the exchange is only compared when present.
    pub fn matches(&self, subscription: &Subscription) -> bool {
        let symbol_ok = self
            .symbol
            .as_deref()
            .is_some_and(|s| subscription.matches_symbol(s));
        let exchange_ok = self
            .exchange
            .as_deref()
            .map_or(true, |e| subscription.matches_exchange(e));
        symbol_ok && exchange_ok
    }

    pub fn into_payload(self) -> RawBookPayload {
        RawBookPayload::Delta(self.book)
    }
}

#[derive(Deserialize)]
struct BookMessage {
    book: BookEnvelope,
}

/// A classified text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Keep-alive sentinel, carries no data.
    Heartbeat,
    /// Validated book update.
    Book(BookEnvelope),
    /// Well-formed JSON that is not a book update.
    Other,
    /// Unparseable or invalid payload.
    Malformed(String),
}

impl StreamFrame {
    /// Classify a text frame.
    pub fn classify(text: &str, heartbeat: &str) -> Self {
        if text.trim() == heartbeat {
            return Self::Heartbeat;
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return Self::Malformed(WsError::Json(e).to_string()),
        };
        if value.get("book").is_none() {
            return Self::Other;
        }

        let message: BookMessage = match serde_json::from_value(value) {
            Ok(m) => m,
            Err(e) => return Self::Malformed(WsError::Json(e).to_string()),
        };
        if let Err(e) = message.book.book.validate() {
            return Self::Malformed(WsError::MalformedPayload(e.to_string()).to_string());
        }

        Self::Book(message.book)
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}
