//! Feed and poller configuration.

use depthline_ws::{BackoffPolicy, DEFAULT_HEARTBEAT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Depth feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Minimum interval between two applied stream updates (ms). Default: 500.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Poll period while the stream is down (ms). Default: 5,000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Depth requested from the pull endpoint. None lets the server decide.
    #[serde(default)]
    pub book_limit: Option<u32>,
    /// Stream base URL.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Heartbeat sentinel text.
    #[serde(default = "default_heartbeat")]
    pub heartbeat: String,
    /// Stream reconnection while polling.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_stream_url() -> String {
    "ws://localhost:8768".to_string()
}

fn default_heartbeat() -> String {
    DEFAULT_HEARTBEAT.to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            book_limit: None,
            stream_url: default_stream_url(),
            heartbeat: default_heartbeat(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Stream reconnection policy.
///
/// With `enabled = false` a feed that fell back to polling stays there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Default: true.
    #[serde(default = "default_reconnect_enabled")]
    pub enabled: bool,
    /// Base delay for exponential backoff (ms). Default: 1,000.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff (ms). Default: 30,000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Maximum attempts per outage (0 = infinite).
    #[serde(default)]
    pub max_attempts: u32,
    /// Random jitter added to each delay, upper bound (ms). Default: 1,000.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_reconnect_enabled() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconnect_enabled(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: 0,
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl From<&ReconnectConfig> for BackoffPolicy {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            base_delay_ms: cfg.base_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
            max_attempts: cfg.max_attempts,
            jitter_ms: cfg.jitter_ms,
        }
    }
}

/// Candle poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcConfig {
    /// Refresh period (ms). Default: 60,000.
    #[serde(default = "default_ohlc_interval_ms")]
    pub interval_ms: u64,
    /// Default timeframe. Default: "1d".
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_ohlc_interval_ms() -> u64 {
    60_000
}

fn default_timeframe() -> String {
    "1d".to_string()
}

impl Default for OhlcConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_ohlc_interval_ms(),
            timeframe: default_timeframe(),
        }
    }
}

impl OhlcConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}
