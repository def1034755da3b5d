//! Stream update throttling.

/// Minimum-interval gate for stream updates.
///
/// Only stream book updates go through the gate. Poll responses, backfills and
/// heartbeats bypass it. One gate lives per coordinator instance.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    window_ms: u64,
    last_admitted_ms: Option<u64>,
}

impl ThrottleGate {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_admitted_ms: None,
        }
    }

    /// Admit an update at `now_ms`.
    ///
    /// The first call is always admitted; later calls only once strictly more
    /// than the window has passed since the last admission.
    pub fn admit(&mut self, now_ms: u64) -> bool {
        let admitted = match self.last_admitted_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > self.window_ms,
        };
        if admitted {
            self.last_admitted_ms = Some(now_ms);
        }
        admitted
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn last_admitted(&self) -> Option<u64> {
        self.last_admitted_ms
    }
}
