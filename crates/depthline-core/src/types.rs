//! Small shared value types.
//!
//! Contains the book side, a single price level and the feed lifecycle state
//! published alongside every depth curve.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Side of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Both sides, bids first.
    pub const BOTH: [Side; 2] = [Side::Bid, Side::Ask];

    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Traversal order from the best price outwards.
    ///
    /// Bids are walked from the highest price down, asks from the lowest up.
    pub fn traversal_cmp(&self, a: f64, b: f64) -> Ordering {
        match self {
            Self::Bid => b.total_cmp(&a),
            Self::Ask => a.total_cmp(&b),
        }
    }

    /// Check if `a` is at least as good as `b` on this side.
    pub fn is_at_least_as_good(&self, a: f64, b: f64) -> bool {
        self.traversal_cmp(a, b) != Ordering::Greater
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// One price level of a book side.
///
/// Volume is per level, never cumulative. Zero volume is allowed and marks a
/// removed price in an incremental update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
}

impl PriceLevel {
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }
}

/// Lifecycle state of a feed coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// Subscription activated, no transport opened yet.
    Idle,
    /// Streaming transport is open and authoritative.
    Streaming,
    /// Streaming failed; the pull endpoint is polled on a timer.
    Polling,
    /// Torn down by a subscription change or consumer teardown.
    Closed,
}

impl FeedState {
    /// Check if a transport (stream or poll timer) may be active in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Streaming | Self::Polling)
    }

    /// Stable lowercase label, used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Polling => "polling",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Polling => write!(f, "POLLING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}
