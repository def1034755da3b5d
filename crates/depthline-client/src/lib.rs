//! depthline client application.
//!
//! Wires the depth feed and the candle poller to the configured endpoints:
//! - TOML configuration with per-field defaults
//! - Stream and pull transports
//! - Structured logging of depth, spread and candle updates

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, DEFAULT_CONFIG_PATH};
pub use error::{AppError, AppResult};
