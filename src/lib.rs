//! Geofence engine library
//!
//! Decides, for each telemetry record, whether a unit is inside each of its
//! assigned zones and emits a transition when that changes. Exposes modules
//! for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
