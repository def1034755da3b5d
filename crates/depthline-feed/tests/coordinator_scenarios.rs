//! End-to-end feed scenarios against mock transports, on paused time.

use depthline_core::{FeedState, RawSnapshot, SnapshotLevel};
use depthline_feed::{DepthFeed, FeedConfig, ReconnectConfig, UpdateSource};
use depthline_rest::{MockReply, MockSnapshotSource};
use depthline_ws::{MockConnector, MockStep, TransportEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn config() -> FeedConfig {
    FeedConfig {
        throttle_ms: 500,
        poll_interval_ms: 5_000,
        reconnect: ReconnectConfig {
            jitter_ms: 0,
            ..ReconnectConfig::default()
        },
        ..FeedConfig::default()
    }
}

fn snapshot(best_bid: f64, best_ask: f64) -> RawSnapshot {
    RawSnapshot {
        bids: vec![
            SnapshotLevel::new(best_bid, 1.0),
            SnapshotLevel::new(best_bid - 1.0, 2.0),
        ],
        asks: vec![
            SnapshotLevel::new(best_ask, 1.0),
            SnapshotLevel::new(best_ask + 1.0, 2.0),
        ],
    }
}

fn book_frame(symbol: &str, best_bid: f64, best_ask: f64) -> String {
    format!(
        r#"{{"book": {{"exchange": "kraken", "symbol": "{symbol}",
            "book": {{"bid": {{"{best_bid}": 1.0}}, "ask": {{"{best_ask}": 1.0}}}}}}}}"#
    )
}

fn setup(config: FeedConfig) -> (DepthFeed, Arc<MockConnector>, Arc<MockSnapshotSource>) {
    let connector = Arc::new(MockConnector::new());
    let source = Arc::new(MockSnapshotSource::new());
    let feed = DepthFeed::new(config, connector.clone(), source.clone());
    (feed, connector, source)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_stream_updates_throttled_and_heartbeats_ignored() {
    let (feed, connector, source) = setup(config());
    let tx = connector.push_channel();

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    tx.send(TransportEvent::Opened).await.unwrap();
    tx.send(TransportEvent::Frame(book_frame("BTC-USD", 100.0, 101.0)))
        .await
        .unwrap();
    settle().await;

    let snap = handle.latest();
    assert_eq!(snap.state, FeedState::Streaming);
    assert_eq!(snap.source, UpdateSource::Stream);
    assert_eq!(snap.curve.best_bid(), Some(100.0));

    tokio::time::sleep(Duration::from_millis(400)).await;
    for _ in 0..3 {
        tx.send(TransportEvent::Frame("heartbeat".to_string()))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // ~610ms after the first admission: heartbeats did not reset the window.
    tx.send(TransportEvent::Frame(book_frame("BTC-USD", 200.0, 201.0)))
        .await
        .unwrap();
    settle().await;
    assert_eq!(handle.curve().best_bid(), Some(200.0));

    tx.send(TransportEvent::Frame(book_frame("BTC-USD", 300.0, 301.0)))
        .await
        .unwrap();
    settle().await;
    assert_eq!(handle.curve().best_bid(), Some(200.0));

    // Other pairs on a shared stream never reach the curve.
    tokio::time::sleep(Duration::from_millis(600)).await;
    tx.send(TransportEvent::Frame(book_frame("ETH-USD", 1.0, 2.0)))
        .await
        .unwrap();
    settle().await;
    assert_eq!(handle.curve().best_bid(), Some(200.0));

    assert_eq!(source.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stream_failure_falls_back_to_polling() {
    let (feed, connector, source) = setup(config());
    connector.push_script(vec![MockStep::Error("connection refused".to_string())]);
    source.push_reply(MockReply::ok(snapshot(100.0, 101.0)));
    source.set_fallback(MockReply::ok(snapshot(110.0, 111.0)));

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    // The coordinator has not run yet.
    assert_eq!(handle.latest().state, FeedState::Idle);

    let trace = Arc::new(Mutex::new(vec![FeedState::Idle]));
    let sink = trace.clone();
    let _task = handle.on_update(move |_, state| {
        let mut trace = sink.lock();
        if trace.last() != Some(&state) {
            trace.push(state);
        }
    });
    settle().await;

    assert_eq!(
        *trace.lock(),
        vec![FeedState::Idle, FeedState::Streaming, FeedState::Polling]
    );
    let snap = handle.latest();
    assert_eq!(snap.state, FeedState::Polling);
    assert_eq!(snap.source, UpdateSource::Backfill);
    assert_eq!(snap.curve.best_bid(), Some(100.0));

    // Exactly one backfill before the first poll tick.
    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(source.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.call_count(), 2);
    let snap = handle.latest();
    assert_eq!(snap.source, UpdateSource::Poll);
    assert_eq!(snap.curve.best_bid(), Some(110.0));
    assert_eq!(snap.state, FeedState::Polling);

    // Reconnects keep failing; polling carries on.
    assert!(connector.open_count() >= 2);
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(source.call_count(), 3);
    assert_eq!(trace.lock().last(), Some(&FeedState::Polling));
}

#[tokio::test(start_paused = true)]
async fn test_slow_poll_result_never_overwrites_newer_one() {
    let (feed, connector, source) = setup(config());
    connector.push_script(vec![MockStep::Error("connection refused".to_string())]);
    source.push_reply(MockReply::ok(snapshot(100.0, 101.0)));
    // The poll at 5s answers after the poll at 10s.
    source.push_reply(MockReply::ok(snapshot(200.0, 201.0)).after(Duration::from_secs(7)));
    source.push_reply(MockReply::ok(snapshot(300.0, 301.0)).after(Duration::from_millis(100)));

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    settle().await;
    assert_eq!(handle.curve().best_bid(), Some(100.0));

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(source.call_count(), 3);
    assert_eq!(handle.curve().best_bid(), Some(300.0));

    // The 5s poll has landed by now and was dropped.
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(source.call_count(), 3);
    let snap = handle.latest();
    assert_eq!(snap.curve.best_bid(), Some(300.0));
    assert_eq!(snap.source, UpdateSource::Poll);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_publishes_empty_curve() {
    let (feed, connector, source) = setup(config());
    connector.push_script(vec![MockStep::Open, MockStep::Close]);
    source.push_reply(MockReply::ok(snapshot(100.0, 101.0)));
    source.set_fallback(MockReply::err("503 Service Unavailable"));

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    settle().await;
    assert_eq!(handle.curve().best_bid(), Some(100.0));

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    let snap = handle.latest();
    assert!(snap.curve.is_empty());
    assert_eq!(snap.state, FeedState::Polling);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_preempts_polling() {
    let (feed, connector, source) = setup(config());
    connector.push_script(vec![MockStep::Error("connection refused".to_string())]);
    let tx = connector.push_channel();
    source.push_reply(MockReply::ok(snapshot(100.0, 101.0)));
    source.push_reply(MockReply::ok(snapshot(500.0, 501.0)).after(Duration::from_secs(2)));

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();

    // The reconnect at 1s takes the channel session; the poll at 5s is slow.
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(connector.open_count(), 2);
    assert_eq!(source.call_count(), 2);
    assert_eq!(handle.state(), FeedState::Polling);

    tx.send(TransportEvent::Opened).await.unwrap();
    settle().await;
    assert_eq!(handle.state(), FeedState::Streaming);

    // The in-flight poll lands after the stream came back and is dropped.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let snap = handle.latest();
    assert_eq!(snap.curve.best_bid(), Some(100.0));
    assert_eq!(snap.source, UpdateSource::Backfill);
    assert_eq!(source.call_count(), 2);

    tx.send(TransportEvent::Frame(book_frame("BTC-USD", 102.0, 103.0)))
        .await
        .unwrap();
    settle().await;
    assert_eq!(handle.latest().source, UpdateSource::Stream);
    assert_eq!(handle.curve().best_bid(), Some(102.0));
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_discards_late_backfill() {
    let (feed, connector, source) = setup(config());
    connector.push_script(vec![MockStep::Error("connection refused".to_string())]);
    connector.push_script(vec![MockStep::Open]);
    source.push_reply(MockReply::ok(snapshot(100.0, 101.0)).after(Duration::from_secs(3)));

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    settle().await;
    assert_eq!(handle.state(), FeedState::Polling);

    handle.resubscribe("kraken", "ETH/USD").unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let snap = handle.latest();
    assert_eq!(snap.subscription.pair, "ETH/USD");
    assert_eq!(snap.epoch, 2);
    assert_eq!(snap.state, FeedState::Streaming);
    assert!(snap.curve.is_empty());

    let targets = connector.targets();
    assert_eq!(targets.last().unwrap().url(), "ws://localhost:8768?exchange=kraken?book=ETH-USD");
    assert_eq!(connector.is_cancelled(0), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_on_update_sees_fallback() {
    let (feed, connector, _source) = setup(config());
    connector.push_script(vec![
        MockStep::Open,
        MockStep::Frame(book_frame("BTC-USD", 100.0, 101.0)),
        MockStep::Delay(Duration::from_millis(50)),
        MockStep::Close,
    ]);

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _task = handle.on_update(move |curve, state| sink.lock().push((curve.best_bid(), state)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = seen.lock().clone();
    assert!(seen.contains(&(Some(100.0), FeedState::Streaming)));
    // Empty backfill from the default mock source.
    assert_eq!(seen.last(), Some(&(None, FeedState::Polling)));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled_stays_polling() {
    let mut cfg = config();
    cfg.reconnect.enabled = false;
    let (feed, connector, source) = setup(cfg);
    connector.push_script(vec![MockStep::Error("connection refused".to_string())]);

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    tokio::time::sleep(Duration::from_secs(57)).await;

    assert_eq!(connector.open_count(), 1);
    assert_eq!(handle.state(), FeedState::Polling);
    // One backfill plus a poll every 5s.
    assert_eq!(source.call_count(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_while_polling_stops_fetches() {
    let (feed, connector, source) = setup(config());
    connector.push_script(vec![MockStep::Error("connection refused".to_string())]);
    source.set_fallback(MockReply::ok(snapshot(100.0, 101.0)));

    let handle = feed.subscribe("kraken", "BTC/USD").unwrap();
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(source.call_count(), 2);
    let opens = connector.open_count();

    handle.unsubscribe();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(source.call_count(), 2);
    assert_eq!(connector.open_count(), opens);
    let snap = handle.latest();
    assert_eq!(snap.state, FeedState::Closed);
    assert!(snap.curve.is_empty());
}
