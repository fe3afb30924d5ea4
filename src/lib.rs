//! Vessel Tracker - Main Library
//!
//! Live AIS position relay: ingest from aisstream.io (or a polling/mock
//! fallback), keep the last known position per vessel, fan out to
//! WebSocket clients.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **aistrack**: Domain, feeds, cache, relay (re-exported from workspace)
//! - **feedsocket**: Reconnecting WebSocket client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use vessel_tracker::bin_common::{load_config_from_env, ConfigType};
//! use vessel_tracker::aistrack::RelayConfig;
//! ```

// Re-export workspace libraries for convenience
pub use aistrack;
pub use feedsocket;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{
        config_path_from_args, load_config_from_env, parse_args, resolve_config_path, ConfigType,
    };
    pub use runner::{BinaryRunner, RunSettings};
}
