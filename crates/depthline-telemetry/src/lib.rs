//! Prometheus metrics and structured logging for depthline.
//!
//! - `init_logging`: tracing subscriber, JSON in production, pretty otherwise
//! - `Metrics`: facade over the feed and poller metrics

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with_filter};
pub use metrics::Metrics;
