//! Shared types for the geofence engine

use crate::domain::geometry::Point;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::warn;
use uuid::Uuid;

/// Generate a UUIDv7 (time-ordered)
#[inline]
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for unit (device) identifiers, typically an IMEI
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for zone IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i64);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Containment state of a (unit, zone) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContainmentState {
    /// Never recorded; differs from both Inside and Outside
    #[default]
    Unknown,
    Inside,
    Outside,
}

impl ContainmentState {
    pub fn from_inside(inside: bool) -> Self {
        if inside {
            ContainmentState::Inside
        } else {
            ContainmentState::Outside
        }
    }

    /// Stored code: 1 Inside, 2 Outside, 0 Unknown
    pub fn code(&self) -> u8 {
        match self {
            ContainmentState::Unknown => 0,
            ContainmentState::Inside => 1,
            ContainmentState::Outside => 2,
        }
    }

    /// Decode a stored code; anything other than 1 or 2 is Unknown
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ContainmentState::Inside,
            2 => ContainmentState::Outside,
            _ => ContainmentState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainmentState::Unknown => "unknown",
            ContainmentState::Inside => "inside",
            ContainmentState::Outside => "outside",
        }
    }
}

impl std::fmt::Display for ContainmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPS timestamp exactly as received from the telemetry source
///
/// Kept as text and forwarded unchanged; `store_format` renders it the way
/// the transition store expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpsTimestamp(pub String);

impl GpsTimestamp {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse `YYYY-MM-DD HH:MM:SS` (taken as UTC) or RFC 3339
    pub fn parse(&self) -> Option<OffsetDateTime> {
        let plain = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        if let Ok(dt) = PrimitiveDateTime::parse(&self.0, plain) {
            return Some(dt.assume_utc());
        }
        OffsetDateTime::parse(&self.0, &Rfc3339).ok()
    }

    /// Render as `DD-Mon-YYYY HH:MM:SS`, or the raw text when unparseable
    pub fn store_format(&self) -> String {
        let out = format_description!(
            "[day]-[month repr:short]-[year] [hour]:[minute]:[second]"
        );
        match self.parse().map(|dt| dt.format(out)) {
            Some(Ok(s)) => s,
            _ => {
                warn!(raw = %self.0, "gps_timestamp_unparsed");
                self.0.clone()
            }
        }
    }
}

impl std::fmt::Display for GpsTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One positional report for a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub unit: UnitId,
    pub point: Point,
    pub timestamp: GpsTimestamp,
    /// Source event code, opaque and forwarded unchanged
    pub event_code: String,
}

/// A detected containment change for one (unit, zone) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    /// UUIDv7 shared by every copy of this transition (journal line, egress)
    pub id: String,
    pub zone_id: ZoneId,
    pub unit: UnitId,
    pub timestamp: GpsTimestamp,
    pub event_code: String,
    pub point: Point,
    /// New state, always Inside or Outside
    pub state: ContainmentState,
    pub message_type: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_codes() {
        assert_eq!(ContainmentState::from_code(1), ContainmentState::Inside);
        assert_eq!(ContainmentState::from_code(2), ContainmentState::Outside);
        assert_eq!(ContainmentState::from_code(0), ContainmentState::Unknown);
        assert_eq!(ContainmentState::from_code(-4), ContainmentState::Unknown);
        assert_eq!(ContainmentState::Inside.code(), 1);
        assert_eq!(ContainmentState::Outside.code(), 2);
        assert_eq!(ContainmentState::from_inside(true), ContainmentState::Inside);
    }

    #[test]
    fn test_unknown_differs_from_known_states() {
        assert_ne!(ContainmentState::Unknown, ContainmentState::Inside);
        assert_ne!(ContainmentState::Unknown, ContainmentState::Outside);
        assert_eq!(ContainmentState::default(), ContainmentState::Unknown);
    }

    #[test]
    fn test_store_format_from_plain_timestamp() {
        let ts = GpsTimestamp::new("2024-03-07 14:05:09");
        assert_eq!(ts.store_format(), "07-Mar-2024 14:05:09");
    }

    #[test]
    fn test_store_format_from_rfc3339() {
        let ts = GpsTimestamp::new("2024-11-30T23:59:01Z");
        assert_eq!(ts.store_format(), "30-Nov-2024 23:59:01");
    }

    #[test]
    fn test_store_format_passes_through_unparseable() {
        let ts = GpsTimestamp::new("yesterday");
        assert!(ts.parse().is_none());
        assert_eq!(ts.store_format(), "yesterday");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&UnitId::new("861234")).unwrap(), "\"861234\"");
        assert_eq!(serde_json::to_string(&ZoneId(42)).unwrap(), "42");
    }
}
