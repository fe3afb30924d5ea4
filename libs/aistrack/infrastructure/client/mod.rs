//! Position sources

pub mod aisstream;
pub mod mock;
pub mod poller;

pub use aisstream::{spawn_ais_stream, AisRouter};
pub use mock::MockAisFeed;
pub use poller::{PollError, PollReport, PositionPoller};
