//! # AIS Track
//!
//! Live vessel-position ingestion and fan-out.
//!
//! ```text
//! aisstream.io ──┐
//! HTTP poller ───┼──→ IngestPipeline ──→ PositionCache (last known position, seq)
//! mock feed ─────┘          │
//!                           └──→ PositionHub ──→ RelayServer sessions ──→ WebSocket clients
//! ```
//!
//! ## Layers
//!
//! - **domain**: vessel identifiers, validated positions, static vessel info
//! - **infrastructure**: feed clients, cache, config, logging, shutdown
//! - **application**: ingest pipeline, pub/sub hub, source supervisor, relay server

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    FeedMode, FeedSupervisor, IngestPipeline, PipelineStats, PositionHub, RelayServer,
    SupervisorStatus,
};
pub use domain::{
    Mmsi, NavigationStatus, PositionSink, PositionSource, PositionUpdate, UpsertOutcome,
    VesselInfo, VesselPosition,
};
pub use infrastructure::{
    init_tracing, CacheSnapshot, Heartbeat, PositionCache, RelayConfig, SharedPositionCache,
    ShutdownManager,
};
