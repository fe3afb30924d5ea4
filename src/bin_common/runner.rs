//! Shared lifecycle for the relay binaries
//!
//! A binary describes itself with a [`RunSettings`], implements
//! [`BinaryRunner::run`] and gets the startup/shutdown logging for free.

use std::time::{Duration, Instant};
use tracing::info;

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(300);
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Process-level timing for a binary
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub name: String,
    /// How often the status line is logged
    pub heartbeat: Duration,
    /// Period of the supervising loop in `run`
    pub tick: Duration,
}

impl RunSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat: DEFAULT_HEARTBEAT,
            tick: DEFAULT_TICK,
        }
    }

    /// Zero keeps the default
    pub fn heartbeat_every(mut self, secs: u64) -> Self {
        if secs > 0 {
            self.heartbeat = Duration::from_secs(secs);
        }
        self
    }

    pub fn tick_every(mut self, tick: Duration) -> Self {
        if !tick.is_zero() {
            self.tick = tick;
        }
        self
    }
}

/// A long-running binary with a main loop and an optional closing summary
pub trait BinaryRunner {
    async fn run(&mut self) -> anyhow::Result<()>;

    fn settings(&self) -> &RunSettings;

    fn summary(&self) -> Option<String> {
        None
    }

    /// Log the banner, run to completion and report how it went
    async fn execute(&mut self) -> anyhow::Result<()> {
        let started = Instant::now();
        let name = self.settings().name.clone();
        info!(
            "{} starting (heartbeat {}s), press Ctrl+C to stop",
            name,
            self.settings().heartbeat.as_secs()
        );

        let result = self.run().await;

        let uptime = started.elapsed().as_secs();
        match &result {
            Ok(()) => info!("{} stopped after {}s", name, uptime),
            Err(e) => info!("{} stopped after {}s with error: {:#}", name, uptime, e),
        }
        if let Some(summary) = self.summary() {
            info!("{}", summary);
        }
        result
    }
}
