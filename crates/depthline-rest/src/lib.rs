//! Pull endpoints for depthline.
//!
//! The backend exposes two GET endpoints:
//! - `order_book/`: full book snapshot, used for backfill and polling
//! - `ohlc/`: candle history
//!
//! Both are reached through the `SnapshotSource` and `CandleSource` traits so
//! feeds can be driven by mocks in tests.

pub mod client;
pub mod error;
pub mod source;

pub use client::{HttpPullClient, RestConfig};
pub use error::{RestError, RestResult};
pub use source::{
    BoxFuture, CandleSource, DynCandleSource, DynSnapshotSource, MockCandleSource, MockReply,
    MockSnapshotSource, SnapshotSource,
};
