//! HTTP polling fallback client

pub mod client;
pub mod types;

pub use client::PositionPoller;
pub use types::{PollError, PollReport, PolledTimestamp, PolledVessel};
