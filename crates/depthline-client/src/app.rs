//! Application wiring.
//!
//! Subscribes the configured market to the depth feed and the candle poller
//! and logs what they publish until shutdown.

use crate::config::AppConfig;
use crate::error::AppResult;
use depthline_core::{CandleSeries, DepthCurve, FeedState, Side};
use depthline_feed::projection::spread_percent;
use depthline_feed::{compute_spread, DepthFeed, OhlcPoller};
use depthline_rest::{DynCandleSource, DynSnapshotSource, HttpPullClient};
use depthline_telemetry::Metrics;
use depthline_ws::{DynStreamConnector, TungsteniteConnector};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    feed: DepthFeed,
    poller: OhlcPoller,
}

impl Application {
    /// Create the application with the WebSocket and HTTP transports.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let pull = Arc::new(HttpPullClient::new(&config.rest)?);
        let connector = Arc::new(TungsteniteConnector::new(config.connection_config()));
        info!(
            stream_url = %config.stream.url,
            api_base = %pull.base_url(),
            "Transports configured"
        );
        Ok(Self::with_transports(config, connector, pull.clone(), pull))
    }

    /// Create the application over arbitrary transports.
    pub fn with_transports(
        config: AppConfig,
        connector: DynStreamConnector,
        snapshots: DynSnapshotSource,
        candles: DynCandleSource,
    ) -> Self {
        let feed = DepthFeed::new(config.feed_config(), connector, snapshots);
        let poller = OhlcPoller::new(config.ohlc.clone(), candles);
        Self {
            config,
            feed,
            poller,
        }
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Run until `shutdown` completes.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> AppResult<()> {
        let sub = &self.config.subscription;
        let timeframe = &self.config.ohlc.timeframe;
        info!(exchange = %sub.exchange, pair = %sub.pair, %timeframe, "Starting application");

        let depth = self.feed.subscribe(&sub.exchange, &sub.pair)?;
        let candles = self.poller.subscribe(&sub.exchange, &sub.pair, timeframe)?;

        let mut last_state = FeedState::Idle;
        let depth_task = depth.on_update(move |curve, state| {
            if state != last_state {
                info!(from = %last_state, to = %state, "Feed state changed");
                last_state = state;
            }
            log_depth(curve, state);
        });
        let candle_task = candles.on_update(log_candles);

        shutdown.await;

        depth.unsubscribe();
        candles.unsubscribe();
        let _ = tokio::join!(depth_task, candle_task);

        match Metrics::render() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        info!("Shutdown complete");
        Ok(())
    }
}

fn log_depth(curve: &DepthCurve, state: FeedState) {
    let (Some(bid), Some(ask)) = (curve.best_bid(), curve.best_ask()) else {
        debug!(%state, bid_points = curve.bids.len(), ask_points = curve.asks.len(), "Depth one-sided or empty");
        return;
    };
    let spread_pct = spread_percent(compute_spread(bid, ask));
    info!(
        %state,
        best_bid = bid,
        best_ask = ask,
        spread_pct = %format!("{spread_pct:.4}"),
        bid_volume = curve.total_volume(Side::Bid),
        ask_volume = curve.total_volume(Side::Ask),
        "Depth update"
    );
}

fn log_candles(series: &CandleSeries) {
    match series.latest() {
        Some(latest) => info!(
            candles = series.len(),
            open_time = ?latest.open_time(),
            close = latest.close,
            volume = latest.volume,
            "Candle update"
        ),
        None => debug!("Candle series empty"),
    }
}
