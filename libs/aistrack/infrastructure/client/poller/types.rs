//! Polling endpoint payloads
//!
//! The endpoint returns either a bare array of vessels or `{"vessels": [...]}`.
//! Rows are decoded one at a time so a single bad row cannot sink a poll.

use crate::domain::{DomainError, Mmsi, PositionSource, VesselPosition};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Poller not configured: {0}")]
    NotConfigured(String),
}

/// Outcome of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Rows in the response
    pub fetched: usize,
    /// Rows that became new cache state
    pub accepted: usize,
    /// Rows that failed decoding or validation
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PollResponse {
    Bare(Vec<serde_json::Value>),
    Wrapped { vessels: Vec<serde_json::Value> },
}

impl PollResponse {
    pub(crate) fn into_rows(self) -> Vec<serde_json::Value> {
        match self {
            PollResponse::Bare(rows) => rows,
            PollResponse::Wrapped { vessels } => vessels,
        }
    }
}

/// One row of the polling response
#[derive(Debug, Clone, Deserialize)]
pub struct PolledVessel {
    pub mmsi: Mmsi,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
    #[serde(default, alias = "sog")]
    pub speed: Option<f64>,
    #[serde(default, alias = "cog")]
    pub course: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<PolledTimestamp>,
}

/// RFC 3339 string or Unix seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PolledTimestamp {
    Unix(i64),
    Text(String),
}

impl PolledTimestamp {
    fn to_datetime(&self) -> Result<DateTime<Utc>, DomainError> {
        match self {
            PolledTimestamp::Unix(secs) => Utc
                .timestamp_opt(*secs, 0)
                .single()
                .ok_or_else(|| DomainError::InvalidTimestamp(secs.to_string())),
            PolledTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| DomainError::InvalidTimestamp(text.clone())),
        }
    }
}

impl PolledVessel {
    /// Validate into a domain position; rows without a timestamp use `fetched_at`
    pub fn into_position(self, fetched_at: DateTime<Utc>) -> Result<VesselPosition, DomainError> {
        let timestamp = match &self.timestamp {
            Some(ts) => ts.to_datetime()?,
            None => fetched_at,
        };

        let mut position = VesselPosition::new(
            self.mmsi,
            self.latitude,
            self.longitude,
            timestamp,
            PositionSource::Poll,
        )?;
        if let Some(speed) = self.speed {
            position = position.with_sog(speed);
        }
        if let Some(course) = self.course {
            position = position.with_cog(course);
        }
        if let Some(heading) = self.heading {
            position = position.with_heading(heading);
        }
        if let Some(name) = self.name.as_deref() {
            position = position.with_name(name);
        }
        Ok(position)
    }
}
