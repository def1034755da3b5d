//! Candle history poller.
//!
//! Fetches the OHLC series for a subscription immediately and then on a fixed
//! interval. A failed fetch publishes an empty series; the next tick retries.

use crate::config::OhlcConfig;
use crate::error::{FeedError, FeedResult};
use crate::publisher::{Epoched, Publisher};
use chrono::{DateTime, Utc};
use depthline_core::{CandleSeries, FeedState, OhlcSubscription};
use depthline_rest::DynCandleSource;
use depthline_telemetry::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Published state of a candle subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSnapshot {
    pub subscription: OhlcSubscription,
    pub epoch: u64,
    /// `Idle` before the first fetch lands, `Polling` afterwards, `Closed` at the end.
    pub state: FeedState,
    pub series: CandleSeries,
    pub updated_at: DateTime<Utc>,
}

impl CandleSnapshot {
    pub fn idle(subscription: OhlcSubscription, epoch: u64) -> Self {
        Self {
            subscription,
            epoch,
            state: FeedState::Idle,
            series: CandleSeries::empty(),
            updated_at: Utc::now(),
        }
    }
}

impl Epoched for CandleSnapshot {
    fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Entry point for candle subscriptions.
#[derive(Clone)]
pub struct OhlcPoller {
    config: Arc<OhlcConfig>,
    source: DynCandleSource,
}

impl OhlcPoller {
    pub fn new(config: OhlcConfig, source: DynCandleSource) -> Self {
        Self {
            config: Arc::new(config),
            source,
        }
    }

    pub fn config(&self) -> &OhlcConfig {
        &self.config
    }

    /// Subscribe to candles of `pair` on `exchange` at `timeframe`.
    ///
    /// Must be called from within a tokio runtime. The first fetch is issued
    /// immediately.
    pub fn subscribe(&self, exchange: &str, pair: &str, timeframe: &str) -> FeedResult<OhlcHandle> {
        let subscription = OhlcSubscription::new(exchange, pair, timeframe)?;
        let publisher = Arc::new(Publisher::new(CandleSnapshot::idle(subscription.clone(), 1)));
        let cancel = CancellationToken::new();
        let activation = cancel.child_token();

        info!(%subscription, "Subscribing to candles");
        self.spawn_task(subscription.clone(), 1, publisher.clone(), activation.clone());

        Ok(OhlcHandle {
            poller: self.clone(),
            publisher,
            active: Mutex::new(Some(Activation {
                subscription,
                epoch: 1,
                cancel: activation,
            })),
            cancel,
        })
    }

    fn spawn_task(
        &self,
        subscription: OhlcSubscription,
        epoch: u64,
        publisher: Arc<Publisher<CandleSnapshot>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let source = self.source.clone();
        let period = self.config.interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = source.fetch_candles(&subscription) => result,
                };

                let series = match result {
                    Ok(candles) => {
                        Metrics::candle_fetch(true);
                        debug!(%subscription, count = candles.len(), "Fetched candles");
                        CandleSeries::new(candles)
                    }
                    Err(e) => {
                        Metrics::candle_fetch(false);
                        let err = FeedError::Fetch(e);
                        error!(%subscription, error = %err, "Error fetching OHLC data");
                        CandleSeries::empty()
                    }
                };

                let snapshot = CandleSnapshot {
                    subscription: subscription.clone(),
                    epoch,
                    state: FeedState::Polling,
                    series,
                    updated_at: Utc::now(),
                };
                if publisher.publish(epoch, snapshot).is_err() {
                    Metrics::stale_discarded();
                    break;
                }
            }
            debug!(%subscription, epoch, "Candle poller stopped");
        })
    }
}

#[derive(Debug)]
struct Activation {
    subscription: OhlcSubscription,
    epoch: u64,
    cancel: CancellationToken,
}

/// Live candle subscription. Dropping the handle stops polling.
pub struct OhlcHandle {
    poller: OhlcPoller,
    publisher: Arc<Publisher<CandleSnapshot>>,
    active: Mutex<Option<Activation>>,
    cancel: CancellationToken,
}

impl OhlcHandle {
    pub fn subscription(&self) -> Option<OhlcSubscription> {
        self.active.lock().as_ref().map(|a| a.subscription.clone())
    }

    pub fn updates(&self) -> watch::Receiver<CandleSnapshot> {
        self.publisher.subscribe()
    }

    pub fn latest(&self) -> CandleSnapshot {
        self.publisher.latest()
    }

    pub fn series(&self) -> CandleSeries {
        self.publisher.latest().series
    }

    /// Invoke `callback` with the current series, then after every published
    /// change, until the handle is unsubscribed or dropped.
    pub fn on_update<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&CandleSeries) + Send + 'static,
    {
        let mut rx = self.publisher.subscribe();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            callback(&rx.borrow_and_update().series);
            loop {
                tokio::select! {
                    biased;
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let snap = rx.borrow_and_update().clone();
                        callback(&snap.series);
                    }
                    () = cancel.cancelled() => return,
                }
            }
        })
    }

    /// Switch exchange, pair or timeframe. The series resets to empty.
    pub fn resubscribe(&self, exchange: &str, pair: &str, timeframe: &str) -> FeedResult<()> {
        let subscription = OhlcSubscription::new(exchange, pair, timeframe)?;
        let mut active = self.active.lock();
        let Some(current) = active.as_mut() else {
            return Err(FeedError::Closed);
        };

        current.cancel.cancel();
        let epoch = self
            .publisher
            .advance(|e| CandleSnapshot::idle(subscription.clone(), e));
        let cancel = self.cancel.child_token();

        info!(from = %current.subscription, to = %subscription, epoch, "Resubscribing candles");
        self.poller
            .spawn_task(subscription.clone(), epoch, self.publisher.clone(), cancel.clone());

        *current = Activation {
            subscription,
            epoch,
            cancel,
        };
        Ok(())
    }

    /// Stop polling. Idempotent.
    pub fn unsubscribe(&self) {
        let Some(current) = self.active.lock().take() else {
            return;
        };
        current.cancel.cancel();
        self.publisher.retire(|snap| {
            snap.state = FeedState::Closed;
            snap.series = CandleSeries::empty();
            snap.updated_at = Utc::now();
        });
        self.cancel.cancel();
        debug!(subscription = %current.subscription, "Candles unsubscribed");
    }

    pub fn is_closed(&self) -> bool {
        self.active.lock().is_none()
    }
}

impl Drop for OhlcHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthline_core::Candle;
    use depthline_rest::{MockCandleSource, MockReply};
    use std::time::Duration;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle {
            timestamp_ms: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn poller(source: Arc<MockCandleSource>) -> OhlcPoller {
        let config = OhlcConfig {
            interval_ms: 60_000,
            timeframe: "1h".to_string(),
        };
        OhlcPoller::new(config, source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_on_interval() {
        let source = Arc::new(MockCandleSource::new());
        source.push_reply(MockReply::ok(vec![candle(2_000, 2.0), candle(1_000, 1.0)]));
        source.push_reply(MockReply::ok(vec![candle(3_000, 3.0)]));

        let handle = poller(source.clone()).subscribe("kraken", "BTC/USD", "1h").unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snap = handle.latest();
        assert_eq!(snap.state, FeedState::Polling);
        assert_eq!(snap.series.len(), 2);
        assert_eq!(snap.series.candles()[0].timestamp_ms, 1_000);
        assert_eq!(source.call_count(), 1);

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert_eq!(source.call_count(), 2);
        assert_eq!(handle.series().latest().map(|c| c.close), Some(3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_publishes_empty_series() {
        let source = Arc::new(MockCandleSource::new());
        source.push_reply(MockReply::ok(vec![candle(1_000, 1.0)]));
        source.push_reply(MockReply::err("boom"));

        let handle = poller(source).subscribe("kraken", "BTC/USD", "1h").unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(handle.series().len(), 1);

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert!(handle.series().is_empty());
        assert_eq!(handle.latest().state, FeedState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_discards_late_result() {
        let source = Arc::new(MockCandleSource::new());
        source.push_reply(MockReply::ok(vec![candle(1_000, 1.0)]).after(Duration::from_secs(5)));
        source.push_reply(MockReply::ok(vec![candle(2_000, 2.0)]));

        let handle = poller(source.clone()).subscribe("kraken", "BTC/USD", "1h").unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.resubscribe("kraken", "ETH/USD", "1d").unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snap = handle.latest();
        assert_eq!(snap.subscription.pair, "ETH/USD");
        assert_eq!(snap.subscription.timeframe, "1d");
        assert_eq!(snap.series.latest().map(|c| c.close), Some(2.0));
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_polling() {
        let source = Arc::new(MockCandleSource::new());
        let handle = poller(source.clone()).subscribe("kraken", "BTC/USD", "1h").unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        handle.unsubscribe();
        handle.unsubscribe();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(source.call_count(), 1);
        assert_eq!(handle.latest().state, FeedState::Closed);
        assert!(matches!(
            handle.resubscribe("kraken", "BTC/USD", "1h"),
            Err(FeedError::Closed)
        ));
    }
}
