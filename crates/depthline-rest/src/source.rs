//! Pull source traits.
//!
//! Abstracts the pull endpoints behind dyn-compatible traits so feeds can be
//! driven by [`MockSnapshotSource`] and [`MockCandleSource`] in tests.

use crate::error::{RestError, RestResult};
use depthline_core::{Candle, OhlcSubscription, RawSnapshot, Subscription};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Source of full order book snapshots.
pub trait SnapshotSource: Send + Sync {
    fn fetch_snapshot<'a>(
        &'a self,
        subscription: &'a Subscription,
        limit: Option<u32>,
    ) -> BoxFuture<'a, RestResult<RawSnapshot>>;
}

/// Source of candle history.
pub trait CandleSource: Send + Sync {
    fn fetch_candles<'a>(
        &'a self,
        subscription: &'a OhlcSubscription,
    ) -> BoxFuture<'a, RestResult<Vec<Candle>>>;
}

/// Arc wrapper for SnapshotSource trait objects.
pub type DynSnapshotSource = Arc<dyn SnapshotSource>;

/// Arc wrapper for CandleSource trait objects.
pub type DynCandleSource = Arc<dyn CandleSource>;

/// Scripted reply of a mock source.
#[derive(Debug, Clone)]
pub struct MockReply<T> {
    /// Time the fetch takes before resolving.
    pub delay: Duration,
    /// Payload, or an error message reported as [`RestError::HttpClient`].
    pub result: Result<T, String>,
}

impl<T> MockReply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(message.into()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug)]
struct ReplyQueue<T, K> {
    queued: Mutex<VecDeque<MockReply<T>>>,
    fallback: Mutex<MockReply<T>>,
    calls: Mutex<Vec<K>>,
}

impl<T: Clone, K: Clone> ReplyQueue<T, K> {
    fn new(fallback: MockReply<T>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn next(&self, key: &K) -> MockReply<T> {
        self.calls.lock().push(key.clone());
        self.queued
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone())
    }

    async fn resolve(reply: MockReply<T>) -> RestResult<T> {
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result.map_err(RestError::HttpClient)
    }
}

/// Mock snapshot source for testing.
///
/// Replies are consumed in call order; once the queue is empty every call
/// gets the fallback reply (an empty snapshot unless changed).
#[derive(Debug)]
pub struct MockSnapshotSource {
    replies: ReplyQueue<RawSnapshot, Subscription>,
}

impl Default for MockSnapshotSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSnapshotSource {
    pub fn new() -> Self {
        Self {
            replies: ReplyQueue::new(MockReply::ok(RawSnapshot::default())),
        }
    }

    /// Queue a reply for the next unanswered call.
    pub fn push_reply(&self, reply: MockReply<RawSnapshot>) {
        self.replies.queued.lock().push_back(reply);
    }

    /// Set the reply used once the queue is empty.
    pub fn set_fallback(&self, reply: MockReply<RawSnapshot>) {
        *self.replies.fallback.lock() = reply;
    }

    /// Number of fetches issued so far.
    pub fn call_count(&self) -> usize {
        self.replies.calls.lock().len()
    }

    /// Subscriptions of all fetches, in call order.
    pub fn calls(&self) -> Vec<Subscription> {
        self.replies.calls.lock().clone()
    }
}

impl SnapshotSource for MockSnapshotSource {
    fn fetch_snapshot<'a>(
        &'a self,
        subscription: &'a Subscription,
        _limit: Option<u32>,
    ) -> BoxFuture<'a, RestResult<RawSnapshot>> {
        let reply = self.replies.next(subscription);
        Box::pin(ReplyQueue::<RawSnapshot, Subscription>::resolve(reply))
    }
}

/// Mock candle source for testing. Same reply discipline as [`MockSnapshotSource`].
#[derive(Debug)]
pub struct MockCandleSource {
    replies: ReplyQueue<Vec<Candle>, OhlcSubscription>,
}

impl Default for MockCandleSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCandleSource {
    pub fn new() -> Self {
        Self {
            replies: ReplyQueue::new(MockReply::ok(Vec::new())),
        }
    }

    pub fn push_reply(&self, reply: MockReply<Vec<Candle>>) {
        self.replies.queued.lock().push_back(reply);
    }

    pub fn set_fallback(&self, reply: MockReply<Vec<Candle>>) {
        *self.replies.fallback.lock() = reply;
    }

    pub fn call_count(&self) -> usize {
        self.replies.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<OhlcSubscription> {
        self.replies.calls.lock().clone()
    }
}

impl CandleSource for MockCandleSource {
    fn fetch_candles<'a>(
        &'a self,
        subscription: &'a OhlcSubscription,
    ) -> BoxFuture<'a, RestResult<Vec<Candle>>> {
        let reply = self.replies.next(subscription);
        Box::pin(ReplyQueue::<Vec<Candle>, OhlcSubscription>::resolve(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthline_core::SnapshotLevel;

    fn btc() -> Subscription {
        Subscription::new("kraken", "BTC/USD").unwrap()
    }

    #[tokio::test]
    async fn test_mock_snapshot_queue_then_fallback() {
        let mock = MockSnapshotSource::new();
        let snap = RawSnapshot {
            bids: vec![SnapshotLevel::new(100.0, 1.0)],
            asks: vec![],
        };
        mock.push_reply(MockReply::ok(snap.clone()));
        mock.push_reply(MockReply::err("boom"));

        let sub = btc();
        assert_eq!(mock.fetch_snapshot(&sub, None).await.unwrap(), snap);
        assert!(matches!(
            mock.fetch_snapshot(&sub, None).await,
            Err(RestError::HttpClient(_))
        ));
        assert_eq!(
            mock.fetch_snapshot(&sub, None).await.unwrap(),
            RawSnapshot::default()
        );
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.calls()[0], sub);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_reply_delay() {
        let mock = MockCandleSource::new();
        mock.set_fallback(MockReply::ok(vec![Candle::new(1, 1.0, 1.0, 1.0, 1.0, 1.0)])
            .after(Duration::from_secs(2)));

        let sub = OhlcSubscription::new("kraken", "BTC/USD", "1d").unwrap();
        let start = tokio::time::Instant::now();
        let candles = mock.fetch_candles(&sub).await.unwrap();
        assert_eq!(candles.len(), 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
