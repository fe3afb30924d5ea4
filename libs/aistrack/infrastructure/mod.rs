//! Infrastructure layer: feed clients, cache, configuration and process plumbing

pub mod cache;
pub mod client;
pub mod config;
pub mod heartbeat;
pub mod logging;
pub mod shutdown;

pub use cache::{CacheSnapshot, CacheStats, PositionCache, SharedPositionCache};
pub use client::{spawn_ais_stream, AisRouter, MockAisFeed, PollError, PollReport, PositionPoller};
pub use config::{ConfigError, RelayConfig};
pub use heartbeat::Heartbeat;
pub use logging::init_tracing;
pub use shutdown::ShutdownManager;
