//! Application run against mock transports.

use depthline_client::{AppConfig, Application};
use depthline_core::{Candle, RawSnapshot, SnapshotLevel};
use depthline_rest::{MockCandleSource, MockReply, MockSnapshotSource};
use depthline_ws::{MockConnector, MockStep};
use std::sync::Arc;
use std::time::Duration;

fn config() -> AppConfig {
    let mut config = AppConfig::from_toml(
        r#"
        [subscription]
        exchange = "kraken"
        pair = "ETH/USD"

        [ohlc]
        interval_ms = 30000
        timeframe = "1h"

        [reconnect]
        jitter_ms = 0
        "#,
    )
    .unwrap();
    config.apply_overrides(None, None, Some("15m".to_string()));
    config
}

#[tokio::test(start_paused = true)]
async fn test_run_until_shutdown() {
    let connector = Arc::new(MockConnector::new());
    connector.push_script(vec![
        MockStep::Open,
        MockStep::Frame(
            r#"{"book": {"symbol": "ETH-USD", "book": {"bid": {"100": 1}, "ask": {"101": 1}}}}"#
                .to_string(),
        ),
        MockStep::Delay(Duration::from_secs(2)),
        MockStep::Error("reset by peer".to_string()),
    ]);

    let snapshots = Arc::new(MockSnapshotSource::new());
    snapshots.set_fallback(MockReply::ok(RawSnapshot {
        bids: vec![SnapshotLevel::new(99.0, 2.0)],
        asks: vec![SnapshotLevel::new(102.0, 2.0)],
    }));

    let candles = Arc::new(MockCandleSource::new());
    candles.set_fallback(MockReply::ok(vec![Candle {
        timestamp_ms: 1_700_000_000_000,
        open: 100.0,
        high: 105.0,
        low: 95.0,
        close: 101.0,
        volume: 12.5,
    }]));

    let app = Application::with_transports(
        config(),
        connector.clone(),
        snapshots.clone(),
        candles.clone(),
    );
    app.run_until(tokio::time::sleep(Duration::from_secs(65)))
        .await
        .unwrap();

    let targets = connector.targets();
    assert_eq!(
        targets[0].url(),
        "ws://localhost:8768?exchange=kraken?book=ETH-USD"
    );
    assert!(connector.is_cancelled(0).unwrap());

    // Backfill after the stream error plus polls every 5s until shutdown.
    assert!(snapshots.call_count() >= 10);
    assert!(snapshots
        .calls()
        .iter()
        .all(|s| s.exchange == "kraken" && s.pair == "ETH/USD"));

    // Immediately, then at 30s and 60s.
    assert_eq!(candles.call_count(), 3);
    assert!(candles.calls().iter().all(|s| s.timeframe == "15m"));
}
