//! Geometry primitives for geofence evaluation
//!
//! Coordinate convention (shared by every zone shape):
//! - Points are stored as (latitude, longitude) in WGS84 degrees
//! - Planar computations use x = longitude, y = latitude
//!
//! Distances are always returned in meters.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the Haversine formula (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude on the mean-radius sphere
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// A WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Planar x (longitude)
    #[inline]
    pub fn x(&self) -> f64 {
        self.lon
    }

    /// Planar y (latitude)
    #[inline]
    pub fn y(&self) -> f64 {
        self.lat
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Great-circle distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (p2.lon - p1.lon).to_radians();

    // Rounding can push `a` just past 1 for near-antipodal pairs
    let a = ((d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2))
        .min(1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Perpendicular distance in meters from `p` to the infinite line through
/// `start` and `end`.
///
/// The distance is NOT clamped to the segment: a point whose perpendicular
/// foot falls beyond either endpoint still reports the distance to the
/// extended line. Positions are projected onto a local equirectangular frame
/// centred on `p`. A degenerate line (`start == end`) reports the distance
/// from `p` to `start`.
pub fn point_to_line_distance(p: Point, start: Point, end: Point) -> f64 {
    let (x1, y1) = local_meters(p, start);
    let (x2, y2) = local_meters(p, end);

    let dx = x2 - x1;
    let dy = y2 - y1;
    let len = dx.hypot(dy);
    if len == 0.0 {
        return x1.hypot(y1);
    }

    // p is the origin of the local frame, so |cross((a - p), (b - a))| / |b - a|
    (x1 * dy - y1 * dx).abs() / len
}

/// Project `q` into an east/north meter frame with `origin` at (0, 0)
#[inline]
fn local_meters(origin: Point, q: Point) -> (f64, f64) {
    let cos_lat = origin.lat.to_radians().cos();
    let x = (q.x() - origin.x()) * METERS_PER_DEGREE * cos_lat;
    let y = (q.y() - origin.y()) * METERS_PER_DEGREE;
    (x, y)
}

/// Latitude offset in degrees that corresponds to `meters` due north
#[inline]
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}
