//! aisstream.io streaming client

pub mod types;
pub mod websocket;

pub use types::{
    parse_frame, parse_time_utc, AisEnvelope, AisMessage, AisRoute, AisSubscription,
};
pub use websocket::{spawn_ais_stream, AisRouter, ControlHandler, PositionHandler, StaticDataHandler};
