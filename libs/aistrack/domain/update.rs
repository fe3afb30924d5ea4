//! What happens to a report once it reaches the cache

use super::vessel::{PositionSource, VesselInfo, VesselPosition};
use serde::Serialize;
use std::time::Duration;

/// An accepted position, stamped with the cache sequence number it took
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionUpdate {
    pub seq: u64,
    pub position: VesselPosition,
}

/// Result of offering a report to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First report for this vessel
    Inserted { seq: u64 },
    /// Newer than the cached report
    Updated { seq: u64 },
    /// Same timestamp as the cached report (stream and poll overlap)
    Duplicate,
    /// Older than the cached report; the cache was not touched
    OutOfOrder,
}

impl UpsertOutcome {
    /// Sequence number assigned, if the report was accepted
    pub fn accepted_seq(&self) -> Option<u64> {
        match self {
            UpsertOutcome::Inserted { seq } | UpsertOutcome::Updated { seq } => Some(*seq),
            UpsertOutcome::Duplicate | UpsertOutcome::OutOfOrder => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_seq().is_some()
    }
}

/// Destination for everything a feed produces
///
/// Feed clients only know this trait; the ingest pipeline implements it.
pub trait PositionSink: Send + Sync {
    fn ingest(&self, position: VesselPosition) -> UpsertOutcome;

    fn ingest_info(&self, info: VesselInfo);

    /// A report from `source` failed validation before becoming a position
    fn reject(&self, source: PositionSource);

    /// Time since the last accepted position; `None` if nothing yet
    fn last_update_age(&self) -> Option<Duration>;
}
