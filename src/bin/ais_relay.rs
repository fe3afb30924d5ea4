//! AIS live-position relay
//!
//! Ingests vessel positions (aisstream.io, HTTP fallback or mock feed) and
//! serves them to WebSocket clients.
//!
//! Usage: ais-relay [--config path/to/relay_config.yaml]

use aistrack::{
    FeedSupervisor, Heartbeat, IngestPipeline, PositionSource, RelayConfig, RelayServer,
    ShutdownManager,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vessel_tracker::bin_common::{parse_args, resolve_config_path, BinaryRunner, ConfigType, RunSettings};

struct RelayApp {
    settings: RunSettings,
    config: RelayConfig,
    shutdown: ShutdownManager,
    pipeline: Arc<IngestPipeline>,
    supervisor: Arc<FeedSupervisor>,
    server: Arc<RelayServer>,
}

impl RelayApp {
    async fn new(config: RelayConfig) -> Result<Self> {
        let pipeline = Arc::new(IngestPipeline::with_capacity(config.relay.channel_capacity));
        let supervisor = Arc::new(FeedSupervisor::new(config.clone(), Arc::clone(&pipeline)));
        let server = RelayServer::bind(
            &config.relay.bind_addr,
            pipeline.cache(),
            pipeline.hub(),
            config.relay.max_clients,
        )
        .await
        .with_context(|| format!("failed to bind relay on {}", config.relay.bind_addr))?;

        let settings = RunSettings::new("AIS Relay")
            .heartbeat_every(config.heartbeat_interval_secs)
            .tick_every(Duration::from_secs(1));

        Ok(Self {
            settings,
            config,
            shutdown: ShutdownManager::new(),
            pipeline,
            supervisor,
            server: Arc::new(server),
        })
    }

    fn log_status(&self) {
        let status = self.supervisor.status();
        let cache = self.pipeline.cache();
        let (vessels, seq, cache_stats) = {
            let cache = cache.read();
            (cache.len(), cache.seq(), cache.stats())
        };
        let stats = self.pipeline.stats();
        let total = stats.total();

        info!(
            "[Heartbeat] mode={} stream={} vessels={} seq={} clients={}",
            status.mode,
            status
                .stream_state
                .map_or_else(|| "-".to_string(), |state| state.to_string()),
            vessels,
            seq,
            self.server.active_sessions(),
        );
        info!(
            "[Heartbeat] accepted={} duplicates={} out_of_order={} rejected={} avg_latency={:.0}ms",
            total.accepted,
            total.duplicates,
            total.out_of_order,
            total.rejected,
            cache_stats.avg_latency_ms(),
        );
        for source in [PositionSource::Stream, PositionSource::Poll, PositionSource::Mock] {
            let s = stats.source(source);
            if s.accepted + s.rejected > 0 {
                info!(
                    "[Heartbeat]   {}: accepted={} rejected={}",
                    source, s.accepted, s.rejected
                );
            }
        }
    }

    /// Drop positions past the configured age and groups nobody listens to
    fn housekeeping(&self) {
        match max_age(self.config.cache_max_age_secs) {
            Some(max_age) => {
                let evicted = self.pipeline.cache().write().evict_older_than(max_age);
                if evicted > 0 {
                    info!(
                        "Evicted {} positions older than {}s",
                        evicted, self.config.cache_max_age_secs
                    );
                }
            }
            None => warn!(
                "cache_max_age_secs={} is out of range, skipping eviction",
                self.config.cache_max_age_secs
            ),
        }
        self.pipeline.hub().prune();
    }
}

impl BinaryRunner for RelayApp {
    async fn run(&mut self) -> Result<()> {
        let supervisor_task: JoinHandle<Result<()>> = {
            let supervisor = Arc::clone(&self.supervisor);
            let flag = self.shutdown.flag();
            tokio::spawn(async move { supervisor.run(flag).await })
        };
        let server_task: JoinHandle<()> = {
            let server = Arc::clone(&self.server);
            let flag = self.shutdown.flag();
            tokio::spawn(async move { server.run(flag).await })
        };

        let mut heartbeat = Heartbeat::new(self.settings.heartbeat.as_secs());
        let tick = self.settings.tick;

        while self.shutdown.is_running() {
            if supervisor_task.is_finished() {
                error!("Feed supervisor exited, shutting down");
                self.shutdown.trigger();
                break;
            }
            if heartbeat.tick() {
                self.log_status();
                self.housekeeping();
            }
            self.shutdown.interruptible_sleep(tick).await;
        }

        info!("Waiting for tasks to finish...");
        let supervisor_result = match supervisor_task.await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = server_task.await {
            warn!("Relay server task failed: {}", e);
        }
        supervisor_result
    }

    fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn summary(&self) -> Option<String> {
        let total = self.pipeline.stats().total();
        Some(format!(
            "Positions: {} accepted, {} duplicates, {} out of order, {} rejected",
            total.accepted, total.duplicates, total.out_of_order, total.rejected
        ))
    }
}

/// Eviction cutoff, `None` when the seconds do not fit a chrono duration
fn max_age(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = resolve_config_path(&parse_args(), ConfigType::Relay);
    let config = RelayConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // Initialize logging with configured level
    aistrack::init_tracing(&config.log_level);
    config.log();

    let mut app = RelayApp::new(config).await?;
    app.shutdown.spawn_signal_handler();
    app.execute().await
}
