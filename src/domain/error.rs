//! Error types shared across the engine and its collaborators
//!
//! - `ZoneError` - a single zone definition cannot be evaluated
//! - `SourceError` - the telemetry or zone source failed
//! - `PersistError` - a transition could not be persisted

use crate::domain::types::UnitId;
use crate::domain::zone::ZoneShapeKind;

/// Why a zone's geometry was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryFault {
    #[error("odd coordinate count {0}, expected (lat, lon) pairs")]
    OddCoordinateCount(usize),

    #[error("{shape} zone needs at least {required} points, got {found}")]
    TooFewPoints { shape: ZoneShapeKind, required: usize, found: usize },

    #[error("radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("proximity threshold must be non-negative and finite, got {0}")]
    InvalidThreshold(f64),

    #[error("non-finite coordinate at index {0}")]
    NonFiniteCoordinate(usize),
}

/// A zone definition that cannot be evaluated
///
/// Surfaced per zone; never aborts evaluation of the remaining zones.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ZoneError {
    #[error("malformed zone geometry: {0}")]
    MalformedGeometry(#[from] GeometryFault),

    #[error("unsupported zone shape code {0}")]
    UnsupportedShape(i32),
}

/// Failure of the telemetry or zone source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The unit has no associated zones (nothing to evaluate, not a failure)
    #[error("no zones associated with unit {0}")]
    NotFound(UnitId),

    /// The source cannot be reached; ends the current run
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// A single record could not be decoded; the row is skipped
    #[error("record decode failed: {0}")]
    Decode(String),
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Unavailable(e.to_string())
    }
}

/// Failure to persist a transition
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("journal write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("transition serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence rejected transition: {0}")]
    Rejected(String),
}
