//! Depth feed facade.
//!
//! [`DepthFeed`] turns an exchange/pair into a [`FeedHandle`]. The handle owns
//! the publication slot and the running coordinator; switching the pair
//! retires the coordinator and starts a fresh one under a new epoch.

use crate::config::FeedConfig;
use crate::coordinator::{CoordinatorDeps, FeedCoordinator};
use crate::error::{FeedError, FeedResult};
use crate::projection::{self, compute_spread, HoverView};
use crate::publisher::{FeedSnapshot, Publisher, UpdateSource};
use chrono::Utc;
use depthline_core::{DepthCurve, FeedState, Side, Subscription};
use depthline_rest::DynSnapshotSource;
use depthline_telemetry::Metrics;
use depthline_ws::DynStreamConnector;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Entry point for depth subscriptions.
#[derive(Clone)]
pub struct DepthFeed {
    deps: CoordinatorDeps,
}

impl DepthFeed {
    pub fn new(
        config: FeedConfig,
        connector: DynStreamConnector,
        source: DynSnapshotSource,
    ) -> Self {
        Self {
            deps: CoordinatorDeps {
                config: Arc::new(config),
                connector,
                source,
            },
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.deps.config
    }

    /// Subscribe to the depth of `pair` on `exchange`.
    ///
    /// Must be called from within a tokio runtime. The stream is opened right
    /// away; no pull fetch is made unless the stream fails.
    pub fn subscribe(&self, exchange: &str, pair: &str) -> FeedResult<FeedHandle> {
        let subscription = Subscription::new(exchange, pair)?;
        let publisher = Arc::new(Publisher::new(FeedSnapshot::idle(subscription.clone(), 1)));
        let cancel = CancellationToken::new();
        let activation = cancel.child_token();

        info!(%subscription, "Subscribing to depth feed");
        FeedCoordinator::new(
            subscription.clone(),
            1,
            self.deps.clone(),
            publisher.clone(),
            activation.clone(),
        )
        .spawn();

        Ok(FeedHandle {
            deps: self.deps.clone(),
            publisher,
            active: Mutex::new(Some(Activation {
                subscription,
                epoch: 1,
                cancel: activation,
            })),
            cancel,
        })
    }
}

#[derive(Debug)]
struct Activation {
    subscription: Subscription,
    epoch: u64,
    cancel: CancellationToken,
}

/// Live depth subscription.
///
/// Dropping the handle stops the feed.
pub struct FeedHandle {
    deps: CoordinatorDeps,
    publisher: Arc<Publisher<FeedSnapshot>>,
    /// `None` once unsubscribed.
    active: Mutex<Option<Activation>>,
    cancel: CancellationToken,
}

impl FeedHandle {
    /// Current subscription, or `None` after [`unsubscribe`](Self::unsubscribe).
    pub fn subscription(&self) -> Option<Subscription> {
        self.active.lock().as_ref().map(|a| a.subscription.clone())
    }

    /// Receiver of published snapshots.
    pub fn updates(&self) -> watch::Receiver<FeedSnapshot> {
        self.publisher.subscribe()
    }

    pub fn latest(&self) -> FeedSnapshot {
        self.publisher.latest()
    }

    pub fn state(&self) -> FeedState {
        self.publisher.latest().state
    }

    pub fn curve(&self) -> DepthCurve {
        self.publisher.latest().curve
    }

    /// Invoke `callback` with the current curve and state, then after every
    /// published change, until the handle is unsubscribed or dropped.
    pub fn on_update<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&DepthCurve, FeedState) + Send + 'static,
    {
        let mut rx = self.publisher.subscribe();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            {
                let snap = rx.borrow_and_update();
                callback(&snap.curve, snap.state);
            }
            loop {
                tokio::select! {
                    biased;
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let snap = rx.borrow_and_update().clone();
                        callback(&snap.curve, snap.state);
                    }
                    () = cancel.cancelled() => return,
                }
            }
        })
    }

    /// Mirror `focal` onto the other side of the current book.
    pub fn other_side_projection(&self, focal: f64) -> Option<(Side, f64)> {
        let curve = self.curve();
        projection::project_other_side(focal, curve.best_bid()?, curve.best_ask()?)
    }

    /// Spread ratio of the current top of book, `None` if a side is empty.
    pub fn spread(&self) -> Option<f64> {
        let curve = self.curve();
        Some(compute_spread(curve.best_bid()?, curve.best_ask()?))
    }

    pub fn hover_view(&self, focal: f64) -> Option<HoverView> {
        projection::hover_view(&self.curve(), focal)
    }

    /// Switch to another exchange/pair.
    ///
    /// The running coordinator is stopped and its epoch retired before the new
    /// one starts, so nothing it still has in flight can be published. The
    /// curve resets to empty until the new subscription delivers.
    pub fn resubscribe(&self, exchange: &str, pair: &str) -> FeedResult<()> {
        let subscription = Subscription::new(exchange, pair)?;
        let mut active = self.active.lock();
        let Some(current) = active.as_mut() else {
            return Err(FeedError::Closed);
        };

        current.cancel.cancel();
        let old_label = current.subscription.to_string();
        // Fails only if the coordinator already retired itself.
        let _ = self.publisher.update(current.epoch, |snap| {
            snap.state = FeedState::Closed;
            snap.updated_at = Utc::now();
            Metrics::feed_state_set(&old_label, FeedState::Closed.as_str());
        });

        let epoch = self
            .publisher
            .advance(|e| FeedSnapshot::idle(subscription.clone(), e));
        let cancel = self.cancel.child_token();

        info!(from = %current.subscription, to = %subscription, epoch, "Resubscribing depth feed");
        FeedCoordinator::new(
            subscription.clone(),
            epoch,
            self.deps.clone(),
            self.publisher.clone(),
            cancel.clone(),
        )
        .spawn();

        *current = Activation {
            subscription,
            epoch,
            cancel,
        };
        Ok(())
    }

    /// Stop the feed. Idempotent.
    ///
    /// Publishes a final `Closed` snapshot with an empty curve.
    pub fn unsubscribe(&self) {
        let Some(current) = self.active.lock().take() else {
            return;
        };
        current.cancel.cancel();
        let label = current.subscription.to_string();
        self.publisher.retire(|snap| {
            Metrics::feed_state_set(&label, FeedState::Closed.as_str());
            snap.state = FeedState::Closed;
            snap.curve = DepthCurve::empty();
            snap.source = UpdateSource::None;
            snap.updated_at = Utc::now();
        });
        self.cancel.cancel();
        debug!(subscription = %current.subscription, "Depth feed unsubscribed");
    }

    pub fn is_closed(&self) -> bool {
        self.active.lock().is_none()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
