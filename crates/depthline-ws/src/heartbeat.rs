//! Idle detection for stream sessions.
//!
//! The server emits a heartbeat roughly every second, so a session that goes
//! silent for several seconds is treated as dead even if the socket is open.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Tracks frame activity of one stream session.
#[derive(Debug)]
pub struct IdleWatchdog {
    idle_timeout_ms: u64,
    last_frame: Instant,
    last_frame_at: DateTime<Utc>,
    frames: u64,
    heartbeats: u64,
}

impl IdleWatchdog {
    pub fn new(idle_timeout_ms: u64) -> Self {
        Self {
            idle_timeout_ms,
            last_frame: Instant::now(),
            last_frame_at: Utc::now(),
            frames: 0,
            heartbeats: 0,
        }
    }

    /// Reset state (called once the session is open).
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.last_frame_at = Utc::now();
        self.frames = 0;
        self.heartbeats = 0;
    }

    /// Record any received frame.
    pub fn record_frame(&mut self) {
        self.last_frame = Instant::now();
        self.last_frame_at = Utc::now();
        self.frames += 1;
    }

    /// Record a heartbeat frame. Counts as activity.
    pub fn record_heartbeat(&mut self) {
        self.record_frame();
        self.heartbeats += 1;
        if self.heartbeats % 60 == 0 {
            debug!(heartbeats = self.heartbeats, "Stream heartbeats received");
        }
    }

    pub fn time_since_last_frame_ms(&self) -> u64 {
        self.last_frame.elapsed().as_millis() as u64
    }

    /// Check if the session has been silent longer than the timeout.
    pub fn is_idle(&self) -> bool {
        self.idle_timeout_ms > 0 && self.time_since_last_frame_ms() > self.idle_timeout_ms
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_ms
    }

    /// Wait for the next idle check.
    pub async fn wait_for_check(&self) {
        if self.idle_timeout_ms == 0 {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_millis((self.idle_timeout_ms / 2).max(1))).await;
    }

    pub fn stats(&self) -> WatchdogStats {
        WatchdogStats {
            last_frame_at: self.last_frame_at,
            frames: self.frames,
            heartbeats: self.heartbeats,
            time_since_last_frame_ms: self.time_since_last_frame_ms(),
        }
    }
}

/// Watchdog statistics.
#[derive(Debug, Clone)]
pub struct WatchdogStats {
    pub last_frame_at: DateTime<Utc>,
    pub frames: u64,
    pub heartbeats: u64,
    pub time_since_last_frame_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_idle_after_timeout() {
        let mut wd = IdleWatchdog::new(1000);
        assert!(!wd.is_idle());

        tokio::time::advance(Duration::from_millis(600)).await;
        wd.record_heartbeat();
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!wd.is_idle());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(wd.is_idle());

        let stats = wd.stats();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.heartbeats, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_disabled() {
        let wd = IdleWatchdog::new(0);
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!wd.is_idle());
    }
}
