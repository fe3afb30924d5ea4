//! Application Layer
//!
//! Wires sources to the cache and the cache to clients.
//! This layer depends on domain and infrastructure layers.

pub mod hub;
pub mod pipeline;
pub mod relay;
pub mod supervisor;

pub use hub::{vessel_group, PositionHub, ALL_VESSELS_GROUP};
pub use pipeline::{IngestPipeline, PipelineStats, SourceStats};
pub use relay::{RelayError, RelayServer};
pub use supervisor::{FeedMode, FeedSupervisor, SupervisorStatus};
