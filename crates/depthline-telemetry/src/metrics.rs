//! Prometheus metrics for depthline feeds.
//!
//! Covers:
//! - Feed state per subscription
//! - Stream message outcomes (admitted, throttled, heartbeat, malformed, mismatched)
//! - Pull fetches (snapshot backfill, snapshot poll, candles)
//! - Fallbacks to polling and stream reconnects
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_counter, CounterVec, Encoder, GaugeVec,
    IntCounter, TextEncoder,
};

/// Feed state per subscription (1 = active state, 0 = inactive).
/// Labels: subscription, state (idle/streaming/polling/closed)
pub static FEED_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "depthline_feed_state",
        "Feed coordinator state (1=active, 0=inactive)",
        &["subscription", "state"]
    )
    .unwrap()
});

/// Stream frames by handling outcome.
pub static STREAM_MESSAGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "depthline_stream_messages_total",
        "Stream frames by handling outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Pull fetches by kind and result.
pub static FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "depthline_fetch_total",
        "Pull endpoint fetches",
        &["kind", "result"]
    )
    .unwrap()
});

/// Transitions from streaming to polling.
pub static FALLBACK_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "depthline_fallback_total",
        "Stream failures that started polling",
        &["subscription"]
    )
    .unwrap()
});

/// Stream reconnect attempts by result.
pub static RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "depthline_reconnect_total",
        "Stream reconnect attempts",
        &["result"]
    )
    .unwrap()
});

/// Candle refreshes by result.
pub static CANDLE_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "depthline_candle_fetch_total",
        "Candle history refreshes",
        &["result"]
    )
    .unwrap()
});

/// Completions dropped because their epoch was superseded.
pub static STALE_DISCARDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "depthline_stale_discarded_total",
        "Publications discarded for a superseded epoch"
    )
    .unwrap()
});

const FEED_STATES: [&str; 4] = ["idle", "streaming", "polling", "closed"];

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set the feed state for a subscription.
    /// Only the active state is set to 1, all others to 0.
    pub fn feed_state_set(subscription: &str, state: &str) {
        for s in FEED_STATES {
            FEED_STATE.with_label_values(&[subscription, s]).set(0.0);
        }
        FEED_STATE.with_label_values(&[subscription, state]).set(1.0);
    }

    /// Record the outcome of one stream frame.
    pub fn stream_message(outcome: &str) {
        STREAM_MESSAGES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a pull fetch (kind: backfill/poll, result: ok/error).
    pub fn fetch(kind: &str, ok: bool) {
        FETCH_TOTAL
            .with_label_values(&[kind, result_label(ok)])
            .inc();
    }

    /// Record a fallback to polling.
    pub fn fallback(subscription: &str) {
        FALLBACK_TOTAL.with_label_values(&[subscription]).inc();
    }

    /// Record a reconnect attempt outcome (result: attempt/opened/exhausted).
    pub fn reconnect(result: &str) {
        RECONNECT_TOTAL.with_label_values(&[result]).inc();
    }

    /// Record a candle refresh.
    pub fn candle_fetch(ok: bool) {
        CANDLE_FETCH_TOTAL
            .with_label_values(&[result_label(ok)])
            .inc();
    }

    /// Record a stale publication.
    pub fn stale_discarded() {
        STALE_DISCARDED_TOTAL.inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}
