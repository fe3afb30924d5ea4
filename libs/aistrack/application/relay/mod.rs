//! WebSocket fan-out to downstream clients
//!
//! Wire format, one JSON object per text frame:
//!
//! ```text
//! server: {"type":"snapshot","seq":S,"vessels":[..]}   on connect and (un)subscribe
//!         {"type":"position","seq":n,"vessel":{..}}   live, n > S
//!         {"type":"resync","missed":n}               client fell behind; a snapshot follows
//!         {"type":"pong"} | {"type":"error","message":".."}
//! client: {"action":"subscribe","mmsi":[..]} | {"action":"unsubscribe"} | {"action":"ping"}
//! ```

pub mod protocol;
pub mod server;
mod session;

pub use protocol::{ClientCommand, ServerMessage};
pub use server::{RelayError, RelayServer};
