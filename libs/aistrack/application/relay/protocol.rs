//! JSON frames exchanged with relay clients

use crate::domain::{Mmsi, VesselPosition};
use serde::{Deserialize, Serialize};

/// Server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// Every cached vessel the session asked for, as of `seq`
    Snapshot {
        seq: u64,
        vessels: &'a [VesselPosition],
    },
    Position {
        seq: u64,
        vessel: &'a VesselPosition,
    },
    /// Updates were dropped because the client fell behind; a snapshot follows
    Resync { missed: u64 },
    Pong,
    Error { message: String },
}

impl ServerMessage<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Only forward these vessels from now on
    Subscribe { mmsi: Vec<Mmsi> },
    /// Back to every vessel
    Unsubscribe,
    Ping,
}

impl ClientCommand {
    pub fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Invalid command: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionSource;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    #[test]
    fn test_server_message_shapes() {
        let vessel = VesselPosition::new(
            Mmsi::new(244000001).unwrap(),
            51.9,
            4.1,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            PositionSource::Stream,
        )
        .unwrap()
        .with_sog(12.5);

        let snapshot: Value = serde_json::from_str(
            &ServerMessage::Snapshot {
                seq: 4,
                vessels: std::slice::from_ref(&vessel),
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["seq"], 4);
        assert_eq!(snapshot["vessels"][0]["mmsi"], 244000001);
        assert_eq!(snapshot["vessels"][0]["source"], "stream");

        let position: Value = serde_json::from_str(
            &ServerMessage::Position { seq: 5, vessel: &vessel }.to_json().unwrap(),
        )
        .unwrap();
        assert_eq!(position["type"], "position");
        assert_eq!(position["vessel"]["sog"], 12.5);

        assert_eq!(ServerMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerMessage::Resync { missed: 3 }.to_json().unwrap(),
            r#"{"type":"resync","missed":3}"#
        );
    }

    #[test]
    fn test_client_commands() {
        assert_eq!(
            ClientCommand::parse(r#"{"action":"subscribe","mmsi":[244000001,"244000002"]}"#).unwrap(),
            ClientCommand::Subscribe {
                mmsi: vec![Mmsi::new(244000001).unwrap(), Mmsi::new(244000002).unwrap()]
            }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"action":"unsubscribe"}"#).unwrap(),
            ClientCommand::Unsubscribe
        );
        assert_eq!(ClientCommand::parse(r#"{"action":"ping"}"#).unwrap(), ClientCommand::Ping);

        assert!(ClientCommand::parse(r#"{"action":"dance"}"#).is_err());
        assert!(ClientCommand::parse(r#"{"action":"subscribe","mmsi":[0]}"#).is_err());
        assert!(ClientCommand::parse("ping").is_err());
    }
}
