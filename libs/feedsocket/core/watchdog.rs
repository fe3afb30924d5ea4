//! Data-flow watchdog
//!
//! A feed socket can stay open while the upstream has silently stopped
//! sending (half-open TCP, stuck relay). The watchdog remembers when the
//! last data frame arrived; once that is older than the idle timeout the
//! connection is torn down and the reconnect loop takes over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tracks the age of the last received frame
///
/// Timestamps are stored as milliseconds since an internal epoch so they
/// fit in an `AtomicU64`. Zero means "armed, nothing received yet".
pub struct FeedWatchdog {
    epoch: Instant,
    /// When the watchdog was (re)armed, ms since epoch
    armed_at_ms: AtomicU64,
    /// Last frame received, ms since epoch (0 = none since arming)
    last_message_ms: AtomicU64,
    idle_timeout: Option<Duration>,
}

impl FeedWatchdog {
    /// `None` disables staleness detection; ages are still tracked
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            epoch: Instant::now(),
            armed_at_ms: AtomicU64::new(0),
            last_message_ms: AtomicU64::new(0),
            idle_timeout,
        }
    }

    fn now_ms(&self) -> u64 {
        // +1 keeps a frame received in the first millisecond distinguishable from "none"
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    /// Start a fresh observation window (called on every new connection)
    pub fn arm(&self) {
        self.armed_at_ms.store(self.now_ms(), Ordering::Release);
        self.last_message_ms.store(0, Ordering::Release);
    }

    /// Record that a frame just arrived
    #[inline]
    pub fn record_message(&self) {
        self.last_message_ms.store(self.now_ms(), Ordering::Release);
    }

    /// Time since the last frame, or since arming if nothing arrived yet
    pub fn idle_for(&self) -> Duration {
        let last = self.last_message_ms.load(Ordering::Acquire);
        let reference = if last == 0 {
            self.armed_at_ms.load(Ordering::Acquire)
        } else {
            last
        };
        Duration::from_millis(self.now_ms().saturating_sub(reference))
    }

    /// Time since the last frame; `None` if nothing arrived since arming
    pub fn time_since_last_message(&self) -> Option<Duration> {
        let last = self.last_message_ms.load(Ordering::Acquire);
        if last == 0 {
            return None;
        }
        Some(Duration::from_millis(self.now_ms().saturating_sub(last)))
    }

    /// Whether the feed has been silent longer than the idle timeout
    pub fn is_stale(&self) -> bool {
        match self.idle_timeout {
            Some(timeout) => self.idle_for() >= timeout,
            None => false,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}
