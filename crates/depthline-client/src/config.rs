//! Application configuration.

use crate::error::{AppError, AppResult};
use depthline_feed::{FeedConfig, OhlcConfig, ReconnectConfig};
use depthline_rest::RestConfig;
use depthline_ws::{ConnectionConfig, DEFAULT_HEARTBEAT};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file used when neither `--config` nor `DEPTHLINE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Market to watch on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_pair")]
    pub pair: String,
}

fn default_exchange() -> String {
    "coinbasepro".to_string()
}

fn default_pair() -> String {
    "BTC/USD".to_string()
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            pair: default_pair(),
        }
    }
}

/// Depth feed tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    /// Minimum interval between applied stream updates (ms). Default: 500.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Poll period while the stream is down (ms). Default: 5,000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Depth requested from the pull endpoint.
    #[serde(default)]
    pub book_limit: Option<u32>,
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            book_limit: None,
        }
    }
}

/// Stream endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_url")]
    pub url: String,
    /// No frame for this long fails the session (ms, 0 = disabled). Default: 10,000.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_heartbeat")]
    pub heartbeat: String,
}

fn default_stream_url() -> String {
    "ws://localhost:8768".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat() -> String {
    DEFAULT_HEARTBEAT.to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            idle_timeout_ms: default_idle_timeout_ms(),
            heartbeat: default_heartbeat(),
        }
    }
}

impl From<StreamConfig> for ConnectionConfig {
    fn from(cfg: StreamConfig) -> Self {
        Self {
            idle_timeout_ms: cfg.idle_timeout_ms,
            heartbeat: cfg.heartbeat,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub ohlc: OhlcConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl AppConfig {
    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(
        &mut self,
        exchange: Option<String>,
        pair: Option<String>,
        timeframe: Option<String>,
    ) {
        if let Some(exchange) = exchange {
            self.subscription.exchange = exchange;
        }
        if let Some(pair) = pair {
            self.subscription.pair = pair;
        }
        if let Some(timeframe) = timeframe {
            self.ohlc.timeframe = timeframe;
        }
    }

    /// Feed configuration assembled from the `[feed]`, `[stream]` and
    /// `[reconnect]` sections.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            throttle_ms: self.feed.throttle_ms,
            poll_interval_ms: self.feed.poll_interval_ms,
            book_limit: self.feed.book_limit,
            stream_url: self.stream.url.clone(),
            heartbeat: self.stream.heartbeat.clone(),
            reconnect: self.reconnect.clone(),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        self.stream.clone().into()
    }
}
