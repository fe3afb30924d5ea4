//! Chooses which source feeds the pipeline
//!
//! With an aisstream.io key the live stream is primary. When it has been
//! down or silent for `failover_after`, the HTTP poller takes over until the
//! stream delivers again. Without a key the mock feed runs instead.

use super::pipeline::IngestPipeline;
use crate::domain::PositionSink;
use crate::infrastructure::client::{spawn_ais_stream, MockAisFeed, PositionPoller};
use crate::infrastructure::config::{ConfigError, RelayConfig, AISSTREAM_API_KEY_VAR};
use crate::infrastructure::shutdown::interruptible_sleep;
use anyhow::Result;
use feedsocket::{ClientEvent, ConnectionState};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Live aisstream.io feed
    Streaming,
    /// Stream is down; HTTP poller is filling in
    Fallback,
    /// Synthetic traffic, no credentials
    Mock,
    Stopped,
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Streaming => "streaming",
            FeedMode::Fallback => "fallback",
            FeedMode::Mock => "mock",
            FeedMode::Stopped => "stopped",
        }
    }

    /// Starting mode for a configuration
    pub fn initial(config: &RelayConfig) -> Result<Self, ConfigError> {
        if config.has_stream_credentials() {
            Ok(FeedMode::Streaming)
        } else if config.mock.enabled {
            Ok(FeedMode::Mock)
        } else {
            Err(ConfigError::EnvVarMissing(format!(
                "{} (or enable the mock feed)",
                AISSTREAM_API_KEY_VAR
            )))
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorStatus {
    pub mode: FeedMode,
    /// `None` unless the stream client exists
    pub stream_state: Option<ConnectionState>,
    pub last_message_age: Option<Duration>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            mode: FeedMode::Stopped,
            stream_state: None,
            last_message_age: None,
        }
    }
}

/// What the stream looks like at one check
#[derive(Debug, Clone, Copy)]
struct StreamHealth {
    connected: bool,
    /// Disconnected time, or silence while connected
    outage: Duration,
    /// `None` until a frame arrives on the current connection
    last_message_age: Option<Duration>,
}

/// Streaming/Fallback transitions
fn next_mode(current: FeedMode, health: StreamHealth, failover_after: Duration) -> FeedMode {
    match current {
        FeedMode::Streaming if health.outage >= failover_after => FeedMode::Fallback,
        FeedMode::Fallback
            if health.connected
                && health.last_message_age.map_or(false, |age| age < failover_after) =>
        {
            FeedMode::Streaming
        }
        other => other,
    }
}

/// Running poller task and its private stop flag
struct FallbackTask {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl FallbackTask {
    async fn stop(self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.handle.await {
            warn!("[Supervisor] Poller task failed: {}", e);
        }
    }
}

pub struct FeedSupervisor {
    config: RelayConfig,
    pipeline: Arc<IngestPipeline>,
    status: RwLock<SupervisorStatus>,
}

impl FeedSupervisor {
    pub fn new(config: RelayConfig, pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            config,
            pipeline,
            status: RwLock::new(SupervisorStatus::default()),
        }
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status.read().clone()
    }

    pub fn mode(&self) -> FeedMode {
        self.status.read().mode
    }

    fn set_mode(&self, mode: FeedMode) {
        let mut status = self.status.write();
        if status.mode != mode {
            info!("[Supervisor] Mode {} -> {}", status.mode, mode);
            status.mode = mode;
        }
    }

    /// Drive the sources until `running` goes false
    pub async fn run(&self, running: Arc<AtomicBool>) -> Result<()> {
        let result = match FeedMode::initial(&self.config)? {
            FeedMode::Mock => {
                self.run_mock(running).await;
                Ok(())
            }
            _ => self.run_streaming(running).await,
        };

        let mut status = self.status.write();
        status.mode = FeedMode::Stopped;
        status.stream_state = None;
        info!("[Supervisor] Stopped");
        result
    }

    async fn run_mock(&self, running: Arc<AtomicBool>) {
        warn!("[Supervisor] No aisstream.io key, serving synthetic traffic");
        self.set_mode(FeedMode::Mock);
        let sink: Arc<dyn PositionSink> = self.pipeline.clone();
        MockAisFeed::new(&self.config.mock).run(sink, running).await;
    }

    async fn run_streaming(&self, running: Arc<AtomicBool>) -> Result<()> {
        let sink: Arc<dyn PositionSink> = self.pipeline.clone();
        let poller = if self.config.poller.is_configured() {
            Some(Arc::new(PositionPoller::new(&self.config.poller, Arc::clone(&sink))?))
        } else {
            None
        };
        let client = spawn_ais_stream(&self.config.aisstream, sink).await?;
        self.set_mode(FeedMode::Streaming);

        let failover_after = self.config.supervisor.failover_after();
        let check_interval = self.config.supervisor.check_interval();
        let mut fallback: Option<FallbackTask> = None;
        let mut down_since = Some(Instant::now());
        let mut client_finished = false;

        while running.load(Ordering::Acquire) {
            while let Some(event) = client.try_recv_event() {
                handle_client_event(event);
            }
            if client.is_finished() && !client_finished {
                client_finished = true;
                error!("[Supervisor] Stream client gave up reconnecting");
            }

            let connected = client.is_connected();
            if connected {
                down_since = None;
            } else if down_since.is_none() {
                down_since = Some(Instant::now());
            }

            let health = StreamHealth {
                connected,
                outage: match down_since {
                    Some(since) => since.elapsed(),
                    None => client.idle_for(),
                },
                last_message_age: client.time_since_last_message(),
            };
            {
                let mut status = self.status.write();
                status.stream_state = Some(client.connection_state());
                status.last_message_age = health.last_message_age;
            }

            let current = self.mode();
            let next = next_mode(current, health, failover_after);
            if next != current {
                match next {
                    FeedMode::Fallback => {
                        warn!(
                            "[Supervisor] Stream out for {:?}, switching to fallback",
                            health.outage
                        );
                        fallback = poller.as_ref().map(|poller| self.start_fallback(poller));
                        if fallback.is_none() {
                            warn!("[Supervisor] No poll endpoint configured, waiting for the stream");
                        }
                    }
                    FeedMode::Streaming => {
                        info!("[Supervisor] Stream is delivering again");
                        if let Some(task) = fallback.take() {
                            task.stop().await;
                        }
                    }
                    _ => {}
                }
                self.set_mode(next);
            }

            if !interruptible_sleep(&running, check_interval).await {
                break;
            }
        }

        if let Some(task) = fallback.take() {
            task.stop().await;
        }
        info!("[Supervisor] Closing stream");
        if let Err(e) = client.shutdown().await {
            warn!("[Supervisor] Error during stream shutdown: {}", e);
        }
        Ok(())
    }

    fn start_fallback(&self, poller: &Arc<PositionPoller>) -> FallbackTask {
        let running = Arc::new(AtomicBool::new(true));
        let interval = self.config.poller.interval();
        let handle = {
            let poller = Arc::clone(poller);
            let running = Arc::clone(&running);
            tokio::spawn(async move { poller.run(interval, running).await })
        };
        FallbackTask { running, handle }
    }
}

fn handle_client_event(event: ClientEvent) {
    match event {
        ClientEvent::Connected => info!("[Supervisor] Stream connected"),
        ClientEvent::Disconnected => warn!("[Supervisor] Stream disconnected"),
        ClientEvent::Reconnecting(attempt) => {
            debug!("[Supervisor] Stream reconnecting (attempt {})", attempt)
        }
        ClientEvent::Stale(idle) => warn!("[Supervisor] Stream silent for {:?}, reconnecting", idle),
        ClientEvent::Error(err) => warn!("[Supervisor] Stream error: {}", err),
    }
}
