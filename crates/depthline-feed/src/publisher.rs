//! Epoch-guarded publication slot.
//!
//! Every activation of a subscription gets a new epoch. Publishing checks the
//! caller's epoch against the current one and sends under the same lock, so a
//! completion from a replaced coordinator can never overwrite the state of its
//! successor.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use depthline_core::{DepthCurve, FeedState, Subscription};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// Where the published curve came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// No data yet for this epoch.
    None,
    Stream,
    Backfill,
    Poll,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Stream => "stream",
            Self::Backfill => "backfill",
            Self::Poll => "poll",
        }
    }
}

/// Published state of a depth feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub subscription: Subscription,
    pub epoch: u64,
    pub state: FeedState,
    pub curve: DepthCurve,
    pub source: UpdateSource,
    pub updated_at: DateTime<Utc>,
}

impl FeedSnapshot {
    /// Fresh state for a newly activated subscription.
    pub fn idle(subscription: Subscription, epoch: u64) -> Self {
        Self {
            subscription,
            epoch,
            state: FeedState::Idle,
            curve: DepthCurve::empty(),
            source: UpdateSource::None,
            updated_at: Utc::now(),
        }
    }
}

/// Values carried in a publication slot.
pub trait Epoched {
    fn epoch(&self) -> u64;
}

impl Epoched for FeedSnapshot {
    fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Single-value publication slot with epoch discipline.
#[derive(Debug)]
pub struct Publisher<T> {
    current: Mutex<u64>,
    tx: watch::Sender<T>,
}

impl<T: Epoched + Clone> Publisher<T> {
    /// Create a slot holding `initial`, whose epoch becomes current.
    pub fn new(initial: T) -> Self {
        let epoch = initial.epoch();
        let (tx, _rx) = watch::channel(initial);
        Self {
            current: Mutex::new(epoch),
            tx,
        }
    }

    pub fn current_epoch(&self) -> u64 {
        *self.current.lock()
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    /// Start a new epoch and publish `make(new_epoch)` as its first value.
    pub fn advance(&self, make: impl FnOnce(u64) -> T) -> u64 {
        let mut current = self.current.lock();
        *current += 1;
        let epoch = *current;
        self.tx.send_replace(make(epoch));
        epoch
    }

    /// Replace the published value, if `epoch` is still current.
    pub fn publish(&self, epoch: u64, value: T) -> FeedResult<()> {
        let current = self.current.lock();
        if *current != epoch {
            debug!(epoch, current = *current, "Discarding stale publication");
            return Err(FeedError::StaleEpoch {
                epoch,
                current: *current,
            });
        }
        self.tx.send_replace(value);
        Ok(())
    }

    /// Modify the published value in place, if `epoch` is still current.
    pub fn update(&self, epoch: u64, modify: impl FnOnce(&mut T)) -> FeedResult<()> {
        let current = self.current.lock();
        if *current != epoch {
            debug!(epoch, current = *current, "Discarding stale update");
            return Err(FeedError::StaleEpoch {
                epoch,
                current: *current,
            });
        }
        self.tx.send_modify(modify);
        Ok(())
    }

    /// Publish a final value for the current epoch, then invalidate it.
    ///
    /// Anything still holding the retired epoch is rejected afterwards.
    pub fn retire(&self, modify: impl FnOnce(&mut T)) {
        let mut current = self.current.lock();
        self.tx.send_modify(modify);
        *current += 1;
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> T {
        self.tx.borrow().clone()
    }
}
