//! Feed client core: builder, connection task, shared state

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod watchdog;
