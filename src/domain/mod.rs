//! Domain models - core geofence types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Point` and distance primitives (`geometry`)
//! - `Zone` - a validated geofence shape (`zone`)
//! - `TelemetryRecord` / `TransitionEvent` - input and output of evaluation
//! - `ContainmentState` - last-known state of a (unit, zone) pair

pub mod error;
pub mod geometry;
pub mod types;
pub mod zone;

// Re-export commonly used types at module level
pub use error::{GeometryFault, PersistError, SourceError, ZoneError};
pub use geometry::Point;
pub use types::{ContainmentState, GpsTimestamp, TelemetryRecord, TransitionEvent, UnitId, ZoneId};
pub use zone::{RawZone, Zone, ZoneAssignment, ZoneGeometry, ZoneShapeKind};
