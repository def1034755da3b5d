//! Feed coordinator.
//!
//! One coordinator task owns one activation of a subscription: its state, its
//! curve and its throttle gate. Stream events, poll ticks, fetch completions
//! and reconnect timers all arrive as [`CoordinatorEvent`]s on a single queue
//! and are applied in receipt order.
//!
//! State machine:
//! - `Idle -> Streaming`: on activation the stream is opened.
//! - `Streaming -> Polling`: on a transport error or close. One backfill fetch
//!   is issued immediately, then the pull endpoint is polled on a timer, and
//!   reconnects are scheduled with exponential backoff.
//! - `Polling -> Streaming`: a reconnect opens. The poll timer is cancelled and
//!   any poll result still in flight is discarded.
//! - `-> Closed`: the owning handle cancels the root token and retires the
//!   epoch; nothing from this activation is published afterwards.

use crate::config::FeedConfig;
use crate::normalizer::normalize;
use crate::publisher::{FeedSnapshot, Publisher, UpdateSource};
use crate::error::FeedError;
use crate::throttle::ThrottleGate;
use chrono::Utc;
use depthline_core::{DepthCurve, FeedState, RawBookPayload, RawSnapshot, Subscription};
use depthline_rest::{DynSnapshotSource, RestResult};
use depthline_telemetry::Metrics;
use depthline_ws::{
    BackoffPolicy, DynStreamConnector, StreamFrame, StreamTarget, TransportEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of a coordinator's event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Kind of pull fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// One-off fetch right after the stream failed.
    Backfill,
    /// Timer-driven fetch while polling.
    Poll,
}

impl FetchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Poll => "poll",
        }
    }

    fn source(&self) -> UpdateSource {
        match self {
            Self::Backfill => UpdateSource::Backfill,
            Self::Poll => UpdateSource::Poll,
        }
    }
}

/// Input to the coordinator.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Event from stream session `session`.
    Transport { session: u64, event: TransportEvent },
    /// Poll timer tick for poll session `session`.
    PollTick { session: u64 },
    /// Completed pull fetch number `request`, issued during poll session `session`.
    FetchDone {
        session: u64,
        request: u64,
        kind: FetchKind,
        result: RestResult<RawSnapshot>,
    },
    /// Reconnect timer `seq` elapsed.
    ReconnectDue { seq: u64 },
}

/// Shared collaborators of every coordinator of a feed.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub config: Arc<FeedConfig>,
    pub connector: DynStreamConnector,
    pub source: DynSnapshotSource,
}

/// Coordinator of one subscription activation.
pub struct FeedCoordinator {
    subscription: Subscription,
    label: String,
    epoch: u64,
    deps: CoordinatorDeps,
    backoff: BackoffPolicy,
    publisher: Arc<Publisher<FeedSnapshot>>,

    state: FeedState,
    curve: DepthCurve,
    gate: ThrottleGate,
    started: Instant,

    root: CancellationToken,
    stream_cancel: Option<CancellationToken>,
    stream_session: u64,
    poll_cancel: Option<CancellationToken>,
    poll_session: u64,
    /// Last pull request issued.
    fetch_seq: u64,
    /// Newest pull request whose result was applied.
    applied_seq: u64,
    reconnect_attempt: u32,
    reconnect_seq: u64,

    events_tx: mpsc::Sender<CoordinatorEvent>,
    events_rx: mpsc::Receiver<CoordinatorEvent>,
}

impl FeedCoordinator {
    pub fn new(
        subscription: Subscription,
        epoch: u64,
        deps: CoordinatorDeps,
        publisher: Arc<Publisher<FeedSnapshot>>,
        root: CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let gate = ThrottleGate::new(deps.config.throttle_ms);
        let backoff = BackoffPolicy::from(&deps.config.reconnect);
        Self {
            label: subscription.to_string(),
            subscription,
            epoch,
            deps,
            backoff,
            publisher,
            state: FeedState::Idle,
            curve: DepthCurve::empty(),
            gate,
            started: Instant::now(),
            root,
            stream_cancel: None,
            stream_session: 0,
            poll_cancel: None,
            poll_session: 0,
            fetch_seq: 0,
            applied_seq: 0,
            reconnect_attempt: 0,
            reconnect_seq: 0,
            events_tx,
            events_rx,
        }
    }

    /// Spawn the coordinator on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the root token is cancelled.
    pub async fn run(mut self) {
        info!(
            exchange = %self.subscription.exchange,
            pair = %self.subscription.pair,
            epoch = self.epoch,
            "Feed coordinator started"
        );
        self.set_state(FeedState::Streaming);
        self.open_stream();

        loop {
            tokio::select! {
                biased;

                () = self.root.cancelled() => break,

                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        self.teardown();
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn gate(&self) -> &ThrottleGate {
        &self.gate
    }

    pub fn curve(&self) -> &DepthCurve {
        &self.curve
    }

    /// Apply one event.
    pub fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Transport { session, event } => {
                if session != self.stream_session {
                    debug!(session, current = self.stream_session, "Ignoring event from old stream session");
                    return;
                }
                self.handle_transport(event);
            }
            CoordinatorEvent::PollTick { session } => {
                if self.poll_cancel.is_none() || session != self.poll_session {
                    debug!(session, "Ignoring tick from cancelled poll timer");
                    return;
                }
                self.spawn_fetch(FetchKind::Poll);
            }
            CoordinatorEvent::FetchDone {
                session,
                request,
                kind,
                result,
            } => {
                if self.poll_cancel.is_none() || session != self.poll_session {
                    debug!(
                        session,
                        kind = kind.as_str(),
                        "Discarding pull result from a finished poll session"
                    );
                    return;
                }
                if request <= self.applied_seq {
                    debug!(
                        request,
                        applied = self.applied_seq,
                        kind = kind.as_str(),
                        "Discarding pull result older than the applied one"
                    );
                    Metrics::stale_discarded();
                    return;
                }
                self.applied_seq = request;
                self.apply_fetch(kind, result);
            }
            CoordinatorEvent::ReconnectDue { seq } => {
                if seq != self.reconnect_seq || self.state != FeedState::Polling {
                    return;
                }
                Metrics::reconnect("attempt");
                info!(
                    exchange = %self.subscription.exchange,
                    pair = %self.subscription.pair,
                    attempt = self.reconnect_attempt,
                    "Attempting stream reconnect"
                );
                self.open_stream();
            }
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.reconnect_attempt > 0 {
                    Metrics::reconnect("opened");
                    info!(
                        exchange = %self.subscription.exchange,
                        pair = %self.subscription.pair,
                        attempts = self.reconnect_attempt,
                        "Stream reconnected, leaving polling"
                    );
                }
                self.reconnect_attempt = 0;
                self.stop_polling();
                self.set_state(FeedState::Streaming);
            }
            TransportEvent::Frame(text) => self.handle_frame(&text),
            TransportEvent::Error(reason) => {
                self.on_transport_failure(FeedError::Transport(reason));
            }
            TransportEvent::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "closed by peer".to_string());
                self.on_transport_failure(FeedError::Transport(reason));
            }
        }
    }

    /// Handle one stream frame: heartbeat filter, parse, subscription check,
    /// throttle, normalize, publish.
    pub fn handle_frame(&mut self, text: &str) {
        let envelope = match StreamFrame::classify(text, &self.deps.config.heartbeat) {
            StreamFrame::Heartbeat => {
                Metrics::stream_message("heartbeat");
                return;
            }
            StreamFrame::Other => {
                Metrics::stream_message("ignored");
                return;
            }
            StreamFrame::Malformed(reason) => {
                let err = FeedError::Malformed(reason);
                debug!(error = %err, "Dropping stream payload");
                Metrics::stream_message("malformed");
                return;
            }
            StreamFrame::Book(envelope) => envelope,
        };

        if !envelope.matches(&self.subscription) {
            debug!(
                symbol = ?envelope.symbol,
                exchange = ?envelope.exchange,
                expected = %self.label,
                "Dropping book update for another subscription"
            );
            Metrics::stream_message("mismatched");
            return;
        }

        let now_ms = self.started.elapsed().as_millis() as u64;
        if !self.gate.admit(now_ms) {
            Metrics::stream_message("throttled");
            return;
        }

        self.curve = normalize(&envelope.into_payload());
        Metrics::stream_message("admitted");
        self.publish(UpdateSource::Stream);
    }

    fn on_transport_failure(&mut self, err: FeedError) {
        if let Some(cancel) = self.stream_cancel.take() {
            cancel.cancel();
        }

        if self.state == FeedState::Polling {
            debug!(error = %err, attempt = self.reconnect_attempt, "Stream reconnect failed");
        } else {
            warn!(
                exchange = %self.subscription.exchange,
                pair = %self.subscription.pair,
                error = %err,
                "Could not keep stream connection, falling back to periodic pull refresh"
            );
            Metrics::fallback(&self.label);
            self.set_state(FeedState::Polling);
            self.start_polling();
        }

        self.schedule_reconnect();
    }

    fn open_stream(&mut self) {
        if let Some(old) = self.stream_cancel.take() {
            old.cancel();
        }
        self.stream_session += 1;
        let session = self.stream_session;
        let cancel = self.root.child_token();
        self.stream_cancel = Some(cancel.clone());

        let target = StreamTarget::new(&self.deps.config.stream_url, self.subscription.clone());
        debug!(url = %target, session, "Opening stream");
        let mut rx = self.deps.connector.open(&target, cancel.clone());
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let terminal = event.is_terminal();
                if tx
                    .send(CoordinatorEvent::Transport { session, event })
                    .await
                    .is_err()
                    || terminal
                {
                    return;
                }
            }
            if !cancel.is_cancelled() {
                let event = TransportEvent::Closed(Some("transport ended".to_string()));
                let _ = tx.send(CoordinatorEvent::Transport { session, event }).await;
            }
        });
    }

    fn start_polling(&mut self) {
        self.stop_polling();
        self.poll_session += 1;
        let session = self.poll_session;
        let cancel = self.root.child_token();
        self.poll_cancel = Some(cancel.clone());

        self.spawn_fetch(FetchKind::Backfill);

        let period = self.deps.config.poll_interval();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    _ = interval.tick() => {
                        if tx.send(CoordinatorEvent::PollTick { session }).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        debug!(
            session,
            period_ms = period.as_millis() as u64,
            "Poll timer started"
        );
    }

    fn stop_polling(&mut self) {
        if let Some(cancel) = self.poll_cancel.take() {
            cancel.cancel();
            debug!(session = self.poll_session, "Poll timer cancelled");
        }
    }

    fn spawn_fetch(&mut self, kind: FetchKind) {
        self.fetch_seq += 1;
        let request = self.fetch_seq;
        let source = self.deps.source.clone();
        let subscription = self.subscription.clone();
        let limit = self.deps.config.book_limit;
        let session = self.poll_session;
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let result = source.fetch_snapshot(&subscription, limit).await;
            // The coordinator may be gone; its result is then dropped.
            let _ = tx
                .send(CoordinatorEvent::FetchDone {
                    session,
                    request,
                    kind,
                    result,
                })
                .await;
        });
    }

    fn apply_fetch(&mut self, kind: FetchKind, result: RestResult<RawSnapshot>) {
        match result {
            Ok(snapshot) => {
                Metrics::fetch(kind.as_str(), true);
                self.curve = normalize(&RawBookPayload::Snapshot(snapshot));
            }
            Err(e) => {
                Metrics::fetch(kind.as_str(), false);
                let err = FeedError::Fetch(e);
                error!(
                    exchange = %self.subscription.exchange,
                    pair = %self.subscription.pair,
                    kind = kind.as_str(),
                    error = %err,
                    "Error fetching order book"
                );
                self.curve = DepthCurve::empty();
            }
        }
        self.publish(kind.source());
    }

    fn schedule_reconnect(&mut self) {
        if !self.deps.config.reconnect.enabled {
            return;
        }
        let attempt = self.reconnect_attempt + 1;
        if !self.backoff.allows(attempt) {
            if attempt == self.backoff.max_attempts + 1 {
                warn!(
                    exchange = %self.subscription.exchange,
                    pair = %self.subscription.pair,
                    attempts = self.reconnect_attempt,
                    "Reconnect attempts exhausted, staying on polling"
                );
                Metrics::reconnect("exhausted");
            }
            return;
        }
        self.reconnect_attempt = attempt;
        self.reconnect_seq += 1;
        let seq = self.reconnect_seq;

        let delay = self.backoff.delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling stream reconnect");

        let cancel = self.root.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(CoordinatorEvent::ReconnectDue { seq }).await;
                }
            }
        });
    }

    fn set_state(&mut self, state: FeedState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, subscription = %self.label, "Feed state change");
        self.state = state;

        // The gauge is shared by every activation of this label; only the
        // current epoch may write it.
        let label = &self.label;
        let result = self.publisher.update(self.epoch, |snap| {
            snap.state = state;
            snap.updated_at = Utc::now();
            Metrics::feed_state_set(label, state.as_str());
        });
        if result.is_err() {
            self.on_superseded();
        }
    }

    fn publish(&mut self, source: UpdateSource) {
        let snapshot = FeedSnapshot {
            subscription: self.subscription.clone(),
            epoch: self.epoch,
            state: self.state,
            curve: self.curve.clone(),
            source,
            updated_at: Utc::now(),
        };
        if self.publisher.publish(self.epoch, snapshot).is_err() {
            self.on_superseded();
        }
    }

    fn on_superseded(&mut self) {
        Metrics::stale_discarded();
        debug!(epoch = self.epoch, subscription = %self.label, "Coordinator superseded, stopping");
        self.root.cancel();
    }

    fn teardown(&mut self) {
        if let Some(cancel) = self.stream_cancel.take() {
            cancel.cancel();
        }
        self.stop_polling();
        self.state = FeedState::Closed;
        info!(
            exchange = %self.subscription.exchange,
            pair = %self.subscription.pair,
            epoch = self.epoch,
            "Feed coordinator stopped"
        );
    }
}
