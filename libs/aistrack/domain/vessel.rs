//! Vessel identity, validated positions and static vessel data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid MMSI: {0}")]
    InvalidMmsi(String),

    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// AIS speed-over-ground value meaning "not available" (knots)
pub const SOG_NOT_AVAILABLE: f64 = 102.3;

/// AIS true-heading value meaning "not available"
pub const HEADING_NOT_AVAILABLE: u16 = 511;

// =============================================================================
// MMSI
// =============================================================================

/// Maritime Mobile Service Identity, the vessel key everywhere in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "MmsiRepr", into = "u32")]
pub struct Mmsi(u32);

impl Mmsi {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 999_999_999;

    pub fn new(value: u32) -> Result<Self, DomainError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidMmsi(value.to_string()))
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Mmsi {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| DomainError::InvalidMmsi(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<u64> for Mmsi {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| DomainError::InvalidMmsi(value.to_string()))?;
        Self::new(value)
    }
}

impl From<Mmsi> for u32 {
    fn from(mmsi: Mmsi) -> Self {
        mmsi.0
    }
}

/// Feeds send the MMSI either as a number or as a string
#[derive(Deserialize)]
#[serde(untagged)]
enum MmsiRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<MmsiRepr> for Mmsi {
    type Error = DomainError;

    fn try_from(repr: MmsiRepr) -> Result<Self, Self::Error> {
        match repr {
            MmsiRepr::Number(n) => Mmsi::try_from(n),
            MmsiRepr::Text(s) => s.parse(),
        }
    }
}

// =============================================================================
// Navigation status
// =============================================================================

/// AIS navigational status (message types 1-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStatus {
    UnderWayUsingEngine,
    AtAnchor,
    NotUnderCommand,
    RestrictedManoeuvrability,
    ConstrainedByDraught,
    Moored,
    Aground,
    EngagedInFishing,
    UnderWaySailing,
    ReservedHsc,
    ReservedWig,
    TowingAstern,
    PushingAhead,
    Reserved,
    AisSartActive,
    NotDefined,
}

impl NavigationStatus {
    /// Unknown codes map to `NotDefined` (15)
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::UnderWayUsingEngine,
            1 => Self::AtAnchor,
            2 => Self::NotUnderCommand,
            3 => Self::RestrictedManoeuvrability,
            4 => Self::ConstrainedByDraught,
            5 => Self::Moored,
            6 => Self::Aground,
            7 => Self::EngagedInFishing,
            8 => Self::UnderWaySailing,
            9 => Self::ReservedHsc,
            10 => Self::ReservedWig,
            11 => Self::TowingAstern,
            12 => Self::PushingAhead,
            13 => Self::Reserved,
            14 => Self::AisSartActive,
            _ => Self::NotDefined,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

// =============================================================================
// Positions
// =============================================================================

/// Where a position report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    Stream,
    Poll,
    Mock,
}

impl PositionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSource::Stream => "stream",
            PositionSource::Poll => "poll",
            PositionSource::Mock => "mock",
        }
    }
}

impl fmt::Display for PositionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated position report
///
/// Coordinates are always in range; optional kinematics are `None` when
/// the report carried the AIS "not available" value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselPosition {
    pub mmsi: Mmsi,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed over ground, knots
    pub sog: Option<f64>,
    /// Course over ground, degrees
    pub cog: Option<f64>,
    /// True heading, degrees
    pub heading: Option<u16>,
    pub nav_status: Option<NavigationStatus>,
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: PositionSource,
}

impl VesselPosition {
    pub fn new(
        mmsi: Mmsi,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
        source: PositionSource,
    ) -> Result<Self, DomainError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(DomainError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(DomainError::InvalidLongitude(longitude));
        }

        Ok(Self {
            mmsi,
            latitude,
            longitude,
            sog: None,
            cog: None,
            heading: None,
            nav_status: None,
            name: None,
            timestamp,
            source,
        })
    }

    pub fn with_sog(mut self, sog: f64) -> Self {
        self.sog = normalize_sog(sog);
        self
    }

    pub fn with_cog(mut self, cog: f64) -> Self {
        self.cog = normalize_cog(cog);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = normalize_heading(heading);
        self
    }

    pub fn with_nav_status(mut self, code: u8) -> Self {
        self.nav_status = Some(NavigationStatus::from_code(code));
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = trim_ais_text(name);
        self
    }
}

/// `None` for "not available", NaN and negative speeds
pub fn normalize_sog(sog: f64) -> Option<f64> {
    if !sog.is_finite() || sog < 0.0 || sog >= SOG_NOT_AVAILABLE {
        None
    } else {
        Some(sog)
    }
}

/// `None` for 360 ("not available") and anything outside [0, 360)
pub fn normalize_cog(cog: f64) -> Option<f64> {
    if !cog.is_finite() || !(0.0..360.0).contains(&cog) {
        None
    } else {
        Some(cog)
    }
}

/// Whole degrees; `None` for 511 ("not available") and anything outside [0, 360)
pub fn normalize_heading(heading: f64) -> Option<u16> {
    if !heading.is_finite() || !(0.0..360.0).contains(&heading) {
        return None;
    }
    Some(heading.trunc() as u16)
}

/// Strip AIS six-bit padding (`@`) and whitespace; `None` if nothing is left
pub fn trim_ais_text(text: &str) -> Option<String> {
    let trimmed = text.trim_matches(|c: char| c == '@' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Static data
// =============================================================================

/// Static and voyage data (AIS message type 5 / 24)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VesselInfo {
    pub mmsi: Mmsi,
    pub name: Option<String>,
    pub call_sign: Option<String>,
    pub destination: Option<String>,
    pub ship_type: Option<u8>,
    pub imo: Option<u32>,
}

impl VesselInfo {
    pub fn new(mmsi: Mmsi) -> Self {
        Self {
            mmsi,
            name: None,
            call_sign: None,
            destination: None,
            ship_type: None,
            imo: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = trim_ais_text(name);
        self
    }

    pub fn with_call_sign(mut self, call_sign: &str) -> Self {
        self.call_sign = trim_ais_text(call_sign);
        self
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = trim_ais_text(destination);
        self
    }

    /// 0 means "not available"
    pub fn with_ship_type(mut self, ship_type: u8) -> Self {
        self.ship_type = (ship_type != 0).then_some(ship_type);
        self
    }

    /// 0 means "not available"
    pub fn with_imo(mut self, imo: u32) -> Self {
        self.imo = (imo != 0).then_some(imo);
        self
    }

    /// Overlay the fields `newer` knows about
    pub fn merge(&mut self, newer: VesselInfo) {
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.call_sign.is_some() {
            self.call_sign = newer.call_sign;
        }
        if newer.destination.is_some() {
            self.destination = newer.destination;
        }
        if newer.ship_type.is_some() {
            self.ship_type = newer.ship_type;
        }
        if newer.imo.is_some() {
            self.imo = newer.imo;
        }
    }
}
