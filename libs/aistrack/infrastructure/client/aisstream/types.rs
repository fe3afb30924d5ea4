//! aisstream.io wire format
//!
//! Every frame is an envelope:
//!
//! ```json
//! {
//!   "MessageType": "PositionReport",
//!   "MetaData": { "MMSI": 259000420, "ShipName": "AUGUSTSON", "time_utc": "2022-12-29 18:22:32.318353 +0000 UTC", ... },
//!   "Message": { "PositionReport": { "Latitude": 66.0, "Longitude": 14.0, "Sog": 0.0, ... } }
//! }
//! ```
//!
//! Rejected subscriptions come back as `{"error": "..."}`.

use crate::domain::{DomainError, Mmsi, PositionSource, VesselInfo, VesselPosition};
use crate::infrastructure::config::AisStreamConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Route keys for the AIS feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AisRoute {
    Positions,
    StaticData,
    Control,
}

/// A parsed AIS frame
#[derive(Debug, Clone)]
pub enum AisMessage {
    Position(VesselPosition),
    StaticData(VesselInfo),
    /// A position report that failed validation
    Rejected { message_type: String, reason: String },
    ServerError(String),
    /// Message types we do not consume
    Unknown(String),
}

const SHIP_STATIC_DATA: &str = "ShipStaticData";

impl AisMessage {
    /// Rejections follow the route of the report type they came from
    pub fn route(&self) -> AisRoute {
        match self {
            AisMessage::Position(_) => AisRoute::Positions,
            AisMessage::StaticData(_) => AisRoute::StaticData,
            AisMessage::Rejected { message_type, .. } if message_type == SHIP_STATIC_DATA => {
                AisRoute::StaticData
            }
            AisMessage::Rejected { .. } => AisRoute::Positions,
            AisMessage::ServerError(_) | AisMessage::Unknown(_) => AisRoute::Control,
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Subscription frame sent after every handshake
#[derive(Clone, Serialize)]
pub struct AisSubscription {
    #[serde(rename = "APIKey")]
    pub api_key: String,
    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<[[f64; 2]; 2]>,
    #[serde(rename = "FiltersShipMMSI", skip_serializing_if = "Vec::is_empty")]
    pub mmsi_filter: Vec<String>,
    #[serde(rename = "FilterMessageTypes", skip_serializing_if = "Vec::is_empty")]
    pub message_types: Vec<String>,
}

impl AisSubscription {
    pub fn from_config(config: &AisStreamConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            bounding_boxes: config.bounding_boxes.iter().map(|b| b.corners()).collect(),
            mmsi_filter: config.mmsi_filter.iter().map(|m| m.to_string()).collect(),
            message_types: config.message_types.clone(),
        }
    }
}

impl fmt::Debug for AisSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AisSubscription")
            .field("api_key", &"****")
            .field("bounding_boxes", &self.bounding_boxes)
            .field("mmsi_filter", &self.mmsi_filter)
            .field("message_types", &self.message_types)
            .finish()
    }
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AisEnvelope {
    #[serde(rename = "MessageType")]
    pub message_type: String,
    #[serde(rename = "MetaData", default)]
    pub metadata: AisMetaData,
    #[serde(rename = "Message", default)]
    pub message: AisMessageBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AisMetaData {
    #[serde(rename = "MMSI", default)]
    pub mmsi: Option<u64>,
    #[serde(rename = "ShipName", default)]
    pub ship_name: Option<String>,
    #[serde(default)]
    pub time_utc: Option<String>,
}

/// The payload keyed by message type; at most one field is set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AisMessageBody {
    #[serde(rename = "PositionReport", default)]
    pub position_report: Option<PositionReport>,
    #[serde(rename = "StandardClassBPositionReport", default)]
    pub standard_class_b: Option<ClassBPositionReport>,
    #[serde(rename = "ExtendedClassBPositionReport", default)]
    pub extended_class_b: Option<ClassBPositionReport>,
    #[serde(rename = "ShipStaticData", default)]
    pub ship_static_data: Option<ShipStaticData>,
}

/// Class A position report (AIS message types 1-3)
#[derive(Debug, Clone, Deserialize)]
pub struct PositionReport {
    #[serde(rename = "UserID")]
    pub user_id: u64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Sog", default)]
    pub sog: Option<f64>,
    #[serde(rename = "Cog", default)]
    pub cog: Option<f64>,
    #[serde(rename = "TrueHeading", default)]
    pub true_heading: Option<f64>,
    #[serde(rename = "NavigationalStatus", default)]
    pub navigational_status: Option<u8>,
    #[serde(rename = "Valid", default = "default_valid")]
    pub valid: bool,
}

/// Class B position report (AIS message types 18 and 19)
#[derive(Debug, Clone, Deserialize)]
pub struct ClassBPositionReport {
    #[serde(rename = "UserID")]
    pub user_id: u64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Sog", default)]
    pub sog: Option<f64>,
    #[serde(rename = "Cog", default)]
    pub cog: Option<f64>,
    #[serde(rename = "TrueHeading", default)]
    pub true_heading: Option<f64>,
    /// Only in extended (type 19) reports
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Valid", default = "default_valid")]
    pub valid: bool,
}

/// Static and voyage data (AIS message type 5)
#[derive(Debug, Clone, Deserialize)]
pub struct ShipStaticData {
    #[serde(rename = "UserID")]
    pub user_id: u64,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "CallSign", default)]
    pub call_sign: Option<String>,
    #[serde(rename = "Destination", default)]
    pub destination: Option<String>,
    #[serde(rename = "Type", default)]
    pub ship_type: Option<u8>,
    #[serde(rename = "ImoNumber", default)]
    pub imo_number: Option<u32>,
    #[serde(rename = "Valid", default = "default_valid")]
    pub valid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AisErrorFrame {
    pub error: String,
}

fn default_valid() -> bool {
    true
}

/// Parse `time_utc` (`2022-12-29 18:22:32.318353 +0000 UTC`)
pub fn parse_time_utc(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix("UTC").unwrap_or(trimmed).trim_end();
    DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Kinematics shared by class A and class B reports
struct Fix {
    user_id: u64,
    latitude: f64,
    longitude: f64,
    sog: Option<f64>,
    cog: Option<f64>,
    heading: Option<f64>,
    nav_status: Option<u8>,
    name: Option<String>,
    valid: bool,
}

impl From<PositionReport> for Fix {
    fn from(r: PositionReport) -> Self {
        Self {
            user_id: r.user_id,
            latitude: r.latitude,
            longitude: r.longitude,
            sog: r.sog,
            cog: r.cog,
            heading: r.true_heading,
            nav_status: r.navigational_status,
            name: None,
            valid: r.valid,
        }
    }
}

impl From<ClassBPositionReport> for Fix {
    fn from(r: ClassBPositionReport) -> Self {
        Self {
            user_id: r.user_id,
            latitude: r.latitude,
            longitude: r.longitude,
            sog: r.sog,
            cog: r.cog,
            heading: r.true_heading,
            nav_status: None,
            name: r.name,
            valid: r.valid,
        }
    }
}

impl AisEnvelope {
    /// Convert into a domain message
    ///
    /// `received_at` stands in for an unparseable `time_utc`.
    pub fn into_message(self, received_at: DateTime<Utc>) -> AisMessage {
        let timestamp = self
            .metadata
            .time_utc
            .as_deref()
            .and_then(parse_time_utc)
            .unwrap_or(received_at);
        let meta_name = self.metadata.ship_name.clone();
        let meta_mmsi = self.metadata.mmsi;
        let body = self.message;

        let fix: Option<Fix> = match self.message_type.as_str() {
            "PositionReport" => body.position_report.map(Fix::from),
            "StandardClassBPositionReport" => body.standard_class_b.map(Fix::from),
            "ExtendedClassBPositionReport" => body.extended_class_b.map(Fix::from),
            SHIP_STATIC_DATA => {
                return match body.ship_static_data {
                    Some(data) => static_to_info(data, meta_mmsi, meta_name.as_deref()),
                    None => rejected(&self.message_type, "missing ShipStaticData body"),
                };
            }
            _ => return AisMessage::Unknown(self.message_type),
        };

        let Some(fix) = fix else {
            return rejected(&self.message_type, "missing report body");
        };
        if !fix.valid {
            return rejected(&self.message_type, "report flagged invalid");
        }

        let mmsi = match resolve_mmsi(fix.user_id, meta_mmsi) {
            Ok(mmsi) => mmsi,
            Err(e) => return rejected(&self.message_type, &e.to_string()),
        };

        let position = match VesselPosition::new(
            mmsi,
            fix.latitude,
            fix.longitude,
            timestamp,
            PositionSource::Stream,
        ) {
            Ok(p) => p,
            Err(e) => return rejected(&self.message_type, &format!("{} ({})", e, mmsi)),
        };

        let mut position = position;
        if let Some(sog) = fix.sog {
            position = position.with_sog(sog);
        }
        if let Some(cog) = fix.cog {
            position = position.with_cog(cog);
        }
        if let Some(heading) = fix.heading {
            position = position.with_heading(heading);
        }
        if let Some(code) = fix.nav_status {
            position = position.with_nav_status(code);
        }
        if let Some(name) = fix.name.as_deref().or(meta_name.as_deref()) {
            position = position.with_name(name);
        }

        AisMessage::Position(position)
    }
}

fn static_to_info(data: ShipStaticData, meta_mmsi: Option<u64>, meta_name: Option<&str>) -> AisMessage {
    if !data.valid {
        return rejected(SHIP_STATIC_DATA, "report flagged invalid");
    }
    let mmsi = match resolve_mmsi(data.user_id, meta_mmsi) {
        Ok(mmsi) => mmsi,
        Err(e) => return rejected(SHIP_STATIC_DATA, &e.to_string()),
    };

    let mut info = VesselInfo::new(mmsi);
    if let Some(name) = data.name.as_deref().or(meta_name) {
        info = info.with_name(name);
    }
    if let Some(call_sign) = data.call_sign.as_deref() {
        info = info.with_call_sign(call_sign);
    }
    if let Some(destination) = data.destination.as_deref() {
        info = info.with_destination(destination);
    }
    if let Some(ship_type) = data.ship_type {
        info = info.with_ship_type(ship_type);
    }
    if let Some(imo) = data.imo_number {
        info = info.with_imo(imo);
    }
    AisMessage::StaticData(info)
}

/// The report's own UserID, else the envelope's MMSI
fn resolve_mmsi(user_id: u64, meta_mmsi: Option<u64>) -> Result<Mmsi, DomainError> {
    match Mmsi::try_from(user_id) {
        Ok(mmsi) => Ok(mmsi),
        Err(e) => match meta_mmsi {
            Some(meta) => Mmsi::try_from(meta),
            None => Err(e),
        },
    }
}

fn rejected(message_type: &str, reason: &str) -> AisMessage {
    AisMessage::Rejected {
        message_type: message_type.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse one text frame
///
/// `Err` only for frames that are neither an envelope nor an error frame.
pub fn parse_frame(text: &str, received_at: DateTime<Utc>) -> Result<AisMessage, serde_json::Error> {
    match serde_json::from_str::<AisEnvelope>(text) {
        Ok(envelope) => Ok(envelope.into_message(received_at)),
        Err(envelope_err) => match serde_json::from_str::<AisErrorFrame>(text) {
            Ok(frame) => Ok(AisMessage::ServerError(frame.error)),
            Err(_) => Err(envelope_err),
        },
    }
}
