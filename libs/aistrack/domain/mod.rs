//! Domain Layer
//!
//! Vessel identity, validated positions and the sink contract feeds write to.
//! This layer has no dependencies on infrastructure or application layers.

pub mod update;
pub mod vessel;

pub use update::{PositionSink, PositionUpdate, UpsertOutcome};
pub use vessel::{
    trim_ais_text, DomainError, Mmsi, NavigationStatus, PositionSource, VesselInfo,
    VesselPosition,
};
