//! Subscription identification types.
//!
//! A feed follows exactly one (exchange, pair) subscription. Pairs are written
//! with a slash (`BTC/USD`); the streaming server names them with a dash
//! (`BTC-USD`), so this module owns the conversion and the matching rules.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One logical feed instance: an exchange and a trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub exchange: String,
    pub pair: String,
}

impl Subscription {
    /// Create a subscription, rejecting blank exchange or pair names.
    pub fn new(exchange: impl Into<String>, pair: impl Into<String>) -> Result<Self> {
        let exchange = exchange.into().trim().to_string();
        let pair = pair.into().trim().to_string();

        if exchange.is_empty() {
            return Err(CoreError::InvalidSubscription(
                "exchange must not be empty".to_string(),
            ));
        }
        if pair.is_empty() {
            return Err(CoreError::InvalidSubscription(
                "pair must not be empty".to_string(),
            ));
        }

        Ok(Self { exchange, pair })
    }

    /// Pair as named on the stream (`BTC/USD` becomes `BTC-USD`).
    pub fn stream_symbol(&self) -> String {
        self.pair.replace('/', "-")
    }

    /// Check if a symbol reported by the stream names this subscription's pair.
    ///
    /// Both slash and dash spellings are accepted, case-insensitively.
    pub fn matches_symbol(&self, symbol: &str) -> bool {
        symbol.replace('/', "-").eq_ignore_ascii_case(&self.stream_symbol())
    }

    /// Check if an exchange name reported by the stream names this subscription's exchange.
    pub fn matches_exchange(&self, exchange: &str) -> bool {
        exchange.eq_ignore_ascii_case(&self.exchange)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.pair)
    }
}

/// Candle history subscription: a pair on an exchange at one timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OhlcSubscription {
    pub exchange: String,
    pub pair: String,
    /// Candle period as understood by the pull endpoint (e.g. `1m`, `1h`, `1d`).
    pub timeframe: String,
}

impl OhlcSubscription {
    pub fn new(
        exchange: impl Into<String>,
        pair: impl Into<String>,
        timeframe: impl Into<String>,
    ) -> Result<Self> {
        let market = Subscription::new(exchange, pair)?;
        let timeframe = timeframe.into().trim().to_string();
        if timeframe.is_empty() {
            return Err(CoreError::InvalidSubscription(
                "timeframe must not be empty".to_string(),
            ));
        }

        Ok(Self {
            exchange: market.exchange,
            pair: market.pair,
            timeframe,
        })
    }

    /// The (exchange, pair) part of this subscription.
    pub fn market(&self) -> Subscription {
        Subscription {
            exchange: self.exchange.clone(),
            pair: self.pair.clone(),
        }
    }
}

impl fmt::Display for OhlcSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.exchange, self.pair, self.timeframe)
    }
}
