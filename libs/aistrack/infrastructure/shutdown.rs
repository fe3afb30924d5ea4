//! Process shutdown: one running flag shared by every long-lived task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Owns the process-wide running flag
///
/// The flag is `true` while running. Every long-lived task gets a clone
/// and exits once it turns `false`.
#[derive(Clone)]
pub struct ShutdownManager {
    running: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clear the flag on Ctrl+C, or SIGTERM on unix
    pub fn spawn_signal_handler(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!("Received {}, shutting down gracefully...", signal);
            manager.trigger();
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request shutdown without a signal
    pub fn trigger(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Clone of the running flag for tasks
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub async fn interruptible_sleep(&self, duration: Duration) -> bool {
        interruptible_sleep(&self.running, duration).await
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "Ctrl+C",
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!("SIGTERM handler unavailable ({}), listening for Ctrl+C only", e);
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C handler failed: {}", e);
        // Without a handler the process can only be killed; keep running
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}

/// Sleep on a bare running flag
///
/// Returns `false` if shutdown cut the sleep short.
pub async fn interruptible_sleep(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    while running.load(Ordering::Acquire) {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        if left.is_zero() {
            return true;
        }
        tokio::time::sleep(left.min(CHECK_INTERVAL)).await;
    }
    false
}
