//! Stream endpoint addressing.

use depthline_core::Subscription;
use std::fmt;

/// Where a stream session connects to, and for which subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    /// Base URL of the streaming server (e.g. `ws://localhost:8768`).
    pub base_url: String,
    pub subscription: Subscription,
}

impl StreamTarget {
    pub fn new(base_url: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            base_url: base_url.into(),
            subscription,
        }
    }

    /// Full connect URL.
    ///
    /// The server reads both parameters from one query string separated by
    /// `?`, so the second separator is `?` rather than `&`.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!(
            "{}?exchange={}?book={}",
            base,
            self.subscription.exchange,
            self.subscription.stream_symbol()
        )
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
