//! Order book synchronization and depth aggregation.
//!
//! - `DepthFeed` / `FeedHandle`: live depth per exchange/pair, stream first
//!   with pull fallback
//! - `normalize`: raw book payloads to cumulative depth curves
//! - `ThrottleGate`: minimum interval between applied stream updates
//! - `projection`: spread, midpoint and hover mirroring
//! - `OhlcPoller` / `OhlcHandle`: periodic candle history

pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod normalizer;
pub mod ohlc;
pub mod projection;
pub mod publisher;
pub mod throttle;

pub use config::{FeedConfig, OhlcConfig, ReconnectConfig};
pub use coordinator::{CoordinatorEvent, FeedCoordinator, FetchKind};
pub use error::{FeedError, FeedResult};
pub use feed::{DepthFeed, FeedHandle};
pub use normalizer::{normalize, normalize_delta, normalize_snapshot};
pub use ohlc::{CandleSnapshot, OhlcHandle, OhlcPoller};
pub use projection::{compute_spread, hover_view, midpoint, project_other_side, HoverView};
pub use publisher::{Epoched, FeedSnapshot, Publisher, UpdateSource};
pub use throttle::ThrottleGate;
