//! Feed error types.
//!
//! None of these reach consumers of a feed: transport and fetch failures
//! degrade to polling or an empty curve, and stale results are dropped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] depthline_rest::RestError),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Stale epoch: {epoch} (current {current})")]
    StaleEpoch { epoch: u64, current: u64 },

    #[error("Feed closed")]
    Closed,

    #[error("Invalid subscription: {0}")]
    Subscription(#[from] depthline_core::CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
