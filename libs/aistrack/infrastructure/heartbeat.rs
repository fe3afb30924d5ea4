//! Heartbeat logging for long-running processes

use std::time::{Duration, Instant};

/// Decides when a periodic status line is due
pub struct Heartbeat {
    interval: Duration,
    last_beat: Instant,
    beats: u64,
}

impl Heartbeat {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            last_beat: Instant::now(),
            beats: 0,
        }
    }

    pub fn should_beat(&self) -> bool {
        self.last_beat.elapsed() >= self.interval
    }

    pub fn beat(&mut self) {
        self.last_beat = Instant::now();
        self.beats += 1;
    }

    /// Beat if due; returns whether it did
    pub fn tick(&mut self) -> bool {
        if self.should_beat() {
            self.beat();
            true
        } else {
            false
        }
    }

    /// Beats so far
    pub fn count(&self) -> u64 {
        self.beats
    }
}
