//! Core domain types for the depthline order-book client.
//!
//! This crate provides the types shared by every other crate:
//! - `Subscription`, `OhlcSubscription`: which (exchange, pair) a feed follows
//! - `RawSnapshot`, `RawDelta`, `RawBookPayload`: the two wire shapes of a book
//! - `DepthCurve`: the canonical cumulative-depth representation
//! - `FeedState`, `Side`, `PriceLevel`: small shared enums and values
//! - `Candle`, `CandleSeries`: price history

pub mod book;
pub mod candle;
pub mod error;
pub mod market;
pub mod types;

pub use book::{DepthCurve, DepthPoint, RawBookPayload, RawDelta, RawSnapshot, SnapshotLevel};
pub use candle::{Candle, CandleSeries};
pub use error::{CoreError, Result};
pub use market::{OhlcSubscription, Subscription};
pub use types::{FeedState, PriceLevel, Side};
