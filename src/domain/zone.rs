//! Zone (geofence) model
//!
//! A zone arrives from the zone source as a `RawZone`: an id, a numeric
//! shape code and a flat list of coordinates. `Zone::from_raw` validates it
//! into one of three shapes:
//! - Circular - center point and radius in meters
//! - Polygonal - ring of at least 3 points (first point not repeated)
//! - Polyline - at least 2 points and a proximity threshold in meters
//!
//! Coordinates are consumed two at a time as (latitude, longitude).

use crate::domain::error::{GeometryFault, ZoneError};
use crate::domain::geometry::Point;
use crate::domain::types::{ContainmentState, ZoneId};
use serde::{Deserialize, Serialize};

/// Default proximity threshold for polyline zones without their own (meters)
pub const DEFAULT_POLYLINE_THRESHOLD_M: f64 = 50.0;

/// Zone shape as encoded by the zone source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneShapeKind {
    Circular,
    Polygonal,
    Polyline,
}

impl ZoneShapeKind {
    /// Numeric code used by the zone source
    pub fn code(&self) -> i32 {
        match self {
            ZoneShapeKind::Circular => 1,
            ZoneShapeKind::Polygonal => 2,
            ZoneShapeKind::Polyline => 3,
        }
    }

    /// Minimum number of points the shape requires
    pub fn min_points(&self) -> usize {
        match self {
            ZoneShapeKind::Circular => 1,
            ZoneShapeKind::Polygonal => 3,
            ZoneShapeKind::Polyline => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneShapeKind::Circular => "circular",
            ZoneShapeKind::Polygonal => "polygonal",
            ZoneShapeKind::Polyline => "polyline",
        }
    }
}

impl TryFrom<i32> for ZoneShapeKind {
    type Error = ZoneError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ZoneShapeKind::Circular),
            2 => Ok(ZoneShapeKind::Polygonal),
            3 => Ok(ZoneShapeKind::Polyline),
            other => Err(ZoneError::UnsupportedShape(other)),
        }
    }
}

impl std::fmt::Display for ZoneShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated zone geometry
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneGeometry {
    /// A zone built with `center: None` never contains anything
    /// (undefined center). Parsed zones always carry a center.
    Circular { center: Option<Point>, radius_m: f64 },
    Polygonal { ring: Vec<Point> },
    Polyline { path: Vec<Point>, threshold_m: f64 },
}

impl ZoneGeometry {
    pub fn kind(&self) -> ZoneShapeKind {
        match self {
            ZoneGeometry::Circular { .. } => ZoneShapeKind::Circular,
            ZoneGeometry::Polygonal { .. } => ZoneShapeKind::Polygonal,
            ZoneGeometry::Polyline { .. } => ZoneShapeKind::Polyline,
        }
    }
}

/// A zone ready for membership evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub geometry: ZoneGeometry,
}

impl Zone {
    pub fn circular(id: ZoneId, center: Point, radius_m: f64) -> Result<Self, ZoneError> {
        if !(radius_m.is_finite() && radius_m > 0.0) {
            return Err(GeometryFault::InvalidRadius(radius_m).into());
        }
        Ok(Self { id, geometry: ZoneGeometry::Circular { center: Some(center), radius_m } })
    }

    pub fn polygonal(id: ZoneId, ring: Vec<Point>) -> Result<Self, ZoneError> {
        require_points(ZoneShapeKind::Polygonal, ring.len())?;
        Ok(Self { id, geometry: ZoneGeometry::Polygonal { ring } })
    }

    pub fn polyline(id: ZoneId, path: Vec<Point>, threshold_m: f64) -> Result<Self, ZoneError> {
        require_points(ZoneShapeKind::Polyline, path.len())?;
        if !(threshold_m.is_finite() && threshold_m >= 0.0) {
            return Err(GeometryFault::InvalidThreshold(threshold_m).into());
        }
        Ok(Self { id, geometry: ZoneGeometry::Polyline { path, threshold_m } })
    }

    /// Validate a raw zone row into an evaluable zone
    pub fn from_raw(raw: &RawZone, polyline_threshold_m: f64) -> Result<Self, ZoneError> {
        let kind = ZoneShapeKind::try_from(raw.shape_code)?;
        let geometry = parse_zone_geometry(kind, &raw.coordinates, raw.radius, polyline_threshold_m)?;
        Ok(Self { id: raw.id, geometry })
    }

    pub fn kind(&self) -> ZoneShapeKind {
        self.geometry.kind()
    }
}

/// Zone row as delivered by the zone source, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawZone {
    pub id: ZoneId,
    pub shape_code: i32,
    /// Flat (lat, lon, lat, lon, ...) list
    pub coordinates: Vec<f64>,
    /// Radius for circular zones, proximity threshold for polylines (0 = default)
    pub radius: f64,
}

/// A zone together with the last recorded state for one (unit, zone) pair
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneAssignment {
    pub zone: RawZone,
    pub last_known_state: ContainmentState,
}

/// Build zone geometry from a flat coordinate list
///
/// Pairs are read as (latitude, longitude). An odd count or too few points
/// for the shape is a format error; a circular zone needs its center.
pub fn parse_zone_geometry(
    kind: ZoneShapeKind,
    coordinates: &[f64],
    radius: f64,
    polyline_threshold_m: f64,
) -> Result<ZoneGeometry, ZoneError> {
    if coordinates.len() % 2 != 0 {
        return Err(GeometryFault::OddCoordinateCount(coordinates.len()).into());
    }
    if let Some(idx) = coordinates.iter().position(|c| !c.is_finite()) {
        return Err(GeometryFault::NonFiniteCoordinate(idx).into());
    }

    let points: Vec<Point> =
        coordinates.chunks_exact(2).map(|pair| Point::new(pair[0], pair[1])).collect();

    match kind {
        ZoneShapeKind::Circular => {
            require_points(kind, points.len())?;
            if !(radius.is_finite() && radius > 0.0) {
                return Err(GeometryFault::InvalidRadius(radius).into());
            }
            // First point is the center; any further points are ignored
            Ok(ZoneGeometry::Circular { center: points.first().copied(), radius_m: radius })
        }
        ZoneShapeKind::Polygonal => {
            require_points(kind, points.len())?;
            Ok(ZoneGeometry::Polygonal { ring: points })
        }
        ZoneShapeKind::Polyline => {
            require_points(kind, points.len())?;
            let threshold_m = if radius > 0.0 { radius } else { polyline_threshold_m };
            if !(threshold_m.is_finite() && threshold_m >= 0.0) {
                return Err(GeometryFault::InvalidThreshold(threshold_m).into());
            }
            Ok(ZoneGeometry::Polyline { path: points, threshold_m })
        }
    }
}

fn require_points(shape: ZoneShapeKind, found: usize) -> Result<(), ZoneError> {
    let required = shape.min_points();
    if found < required {
        return Err(GeometryFault::TooFewPoints { shape, required, found }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(shape_code: i32, coordinates: Vec<f64>, radius: f64) -> RawZone {
        RawZone { id: ZoneId(7), shape_code, coordinates, radius }
    }

    #[test]
    fn test_shape_codes() {
        assert_eq!(ZoneShapeKind::try_from(1).unwrap(), ZoneShapeKind::Circular);
        assert_eq!(ZoneShapeKind::try_from(2).unwrap(), ZoneShapeKind::Polygonal);
        assert_eq!(ZoneShapeKind::try_from(3).unwrap(), ZoneShapeKind::Polyline);
        assert_eq!(ZoneShapeKind::try_from(9), Err(ZoneError::UnsupportedShape(9)));
        assert_eq!(ZoneShapeKind::Polyline.code(), 3);
    }

    #[test]
    fn test_circular_uses_first_pair_as_center() {
        let zone = Zone::from_raw(&raw(1, vec![10.0, 20.0001, 11.0, 21.0], 50.0), 50.0).unwrap();
        assert_eq!(
            zone.geometry,
            ZoneGeometry::Circular { center: Some(Point::new(10.0, 20.0001)), radius_m: 50.0 }
        );
    }

    #[test]
    fn test_circular_without_coordinates_is_malformed() {
        let err = Zone::from_raw(&raw(1, vec![], 50.0), 50.0).unwrap_err();
        assert_eq!(
            err,
            ZoneError::MalformedGeometry(GeometryFault::TooFewPoints {
                shape: ZoneShapeKind::Circular,
                required: 1,
                found: 0,
            })
        );
    }

    #[test]
    fn test_circular_rejects_non_positive_radius() {
        let err = Zone::from_raw(&raw(1, vec![1.0, 2.0], 0.0), 50.0).unwrap_err();
        assert_eq!(err, ZoneError::MalformedGeometry(GeometryFault::InvalidRadius(0.0)));
        assert!(Zone::circular(ZoneId(1), Point::new(0.0, 0.0), -3.0).is_err());
    }

    #[test]
    fn test_odd_coordinate_count_is_malformed() {
        let err = Zone::from_raw(&raw(2, vec![0.0, 0.0, 1.0, 1.0, 2.0], 0.0), 50.0).unwrap_err();
        assert_eq!(err, ZoneError::MalformedGeometry(GeometryFault::OddCoordinateCount(5)));
    }

    #[test]
    fn test_polygon_needs_three_points() {
        let err = Zone::from_raw(&raw(2, vec![0.0, 0.0, 1.0, 1.0], 0.0), 50.0).unwrap_err();
        assert_eq!(
            err,
            ZoneError::MalformedGeometry(GeometryFault::TooFewPoints {
                shape: ZoneShapeKind::Polygonal,
                required: 3,
                found: 2,
            })
        );
    }

    #[test]
    fn test_polyline_needs_two_points() {
        let err = Zone::from_raw(&raw(3, vec![0.0, 0.0], 0.0), 50.0).unwrap_err();
        assert!(matches!(
            err,
            ZoneError::MalformedGeometry(GeometryFault::TooFewPoints { required: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_polyline_threshold_falls_back_to_default() {
        let zone = Zone::from_raw(&raw(3, vec![0.0, 0.0, 0.0, 1.0], 0.0), 50.0).unwrap();
        assert!(matches!(zone.geometry, ZoneGeometry::Polyline { threshold_m, .. } if threshold_m == 50.0));

        let zone = Zone::from_raw(&raw(3, vec![0.0, 0.0, 0.0, 1.0], 120.0), 50.0).unwrap();
        assert!(matches!(zone.geometry, ZoneGeometry::Polyline { threshold_m, .. } if threshold_m == 120.0));
    }

    #[test]
    fn test_unsupported_shape_is_rejected() {
        let err = Zone::from_raw(&raw(4, vec![0.0, 0.0], 10.0), 50.0).unwrap_err();
        assert_eq!(err, ZoneError::UnsupportedShape(4));
    }

    #[test]
    fn test_non_finite_coordinate_is_malformed() {
        let err = Zone::from_raw(&raw(2, vec![0.0, 0.0, f64::NAN, 1.0, 1.0, 1.0], 0.0), 50.0)
            .unwrap_err();
        assert_eq!(err, ZoneError::MalformedGeometry(GeometryFault::NonFiniteCoordinate(2)));
    }

    #[test]
    fn test_polygon_preserves_vertex_order() {
        let zone =
            Zone::from_raw(&raw(2, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0], 0.0), 50.0)
                .unwrap();
        let ZoneGeometry::Polygonal { ring } = zone.geometry else {
            panic!("expected polygon");
        };
        assert_eq!(ring[1], Point::new(0.0, 1.0));
        assert_eq!(ring.len(), 4);
    }
}
