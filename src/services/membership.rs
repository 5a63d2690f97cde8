//! Zone membership evaluation
//!
//! Decides whether a point lies inside a zone, dispatching on shape:
//! - Circular: Haversine distance to the center is at most the radius
//! - Polygonal: even-odd ray casting in the (x = lon, y = lat) plane
//! - Polyline: distance to any segment's line is at most the threshold
//!
//! Evaluation is pure and safe to call from any number of threads.

use crate::domain::error::ZoneError;
use crate::domain::geometry::{haversine_distance, point_to_line_distance, Point};
use crate::domain::zone::{RawZone, Zone, ZoneGeometry};

/// Result of evaluating one zone against one point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Inside,
    Outside,
    /// Circular zone without a center; never contains anything
    UndefinedCenter,
}

impl Verdict {
    #[inline]
    pub fn is_inside(&self) -> bool {
        matches!(self, Verdict::Inside)
    }

    fn from_bool(inside: bool) -> Self {
        if inside {
            Verdict::Inside
        } else {
            Verdict::Outside
        }
    }
}

/// Stateless membership evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipEvaluator;

impl MembershipEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a validated zone
    pub fn evaluate(&self, zone: &Zone, point: Point) -> Verdict {
        match &zone.geometry {
            ZoneGeometry::Circular { center: Some(center), radius_m } => {
                Verdict::from_bool(haversine_distance(*center, point) <= *radius_m)
            }
            ZoneGeometry::Circular { center: None, .. } => Verdict::UndefinedCenter,
            ZoneGeometry::Polygonal { ring } => Verdict::from_bool(ray_cast(ring, point)),
            ZoneGeometry::Polyline { path, threshold_m } => {
                Verdict::from_bool(near_polyline(path, point, *threshold_m))
            }
        }
    }

    /// Validate a raw zone row and evaluate it in one step
    pub fn evaluate_raw(
        &self,
        raw: &RawZone,
        point: Point,
        polyline_threshold_m: f64,
    ) -> Result<Verdict, ZoneError> {
        let zone = Zone::from_raw(raw, polyline_threshold_m)?;
        Ok(self.evaluate(&zone, point))
    }
}

/// Even-odd rule. Points exactly on an edge or vertex may land either way;
/// a ring of fewer than 3 vertices contains nothing.
fn ray_cast(ring: &[Point], p: Point) -> bool {
    let (px, py) = (p.x(), p.y());
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;

    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].x(), ring[i].y());
        let (xj, yj) = (ring[j].x(), ring[j].y());

        if (yi > py) != (yj > py) {
            let x_at_py = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < x_at_py {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn near_polyline(path: &[Point], p: Point, threshold_m: f64) -> bool {
    path.windows(2).any(|seg| point_to_line_distance(p, seg[0], seg[1]) <= threshold_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::GeometryFault;
    use crate::domain::geometry::meters_to_lat_degrees;
    use crate::domain::types::ZoneId;

    fn unit_square() -> Zone {
        Zone::polygonal(
            ZoneId(1),
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.0, 1.0),
                Point::new(1.0, 1.0),
                Point::new(1.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_circle_boundary() {
        let center = Point::new(0.0, 0.0);
        let p = Point::new(0.0, 0.001);
        let d = haversine_distance(center, p);
        let eval = MembershipEvaluator::new();

        let just_inside = Zone::circular(ZoneId(1), center, d + 1e-3).unwrap();
        let just_outside = Zone::circular(ZoneId(1), center, d - 1e-3).unwrap();
        assert_eq!(eval.evaluate(&just_inside, p), Verdict::Inside);
        assert_eq!(eval.evaluate(&just_outside, p), Verdict::Outside);
    }

    #[test]
    fn test_circle_contains_center() {
        let center = Point::new(-12.05, -77.04);
        let zone = Zone::circular(ZoneId(3), center, 1.0).unwrap();
        assert!(MembershipEvaluator::new().evaluate(&zone, center).is_inside());
    }

    #[test]
    fn test_unit_square() {
        let eval = MembershipEvaluator::new();
        let zone = unit_square();
        assert_eq!(eval.evaluate(&zone, Point::new(0.5, 0.5)), Verdict::Inside);
        assert_eq!(eval.evaluate(&zone, Point::new(2.0, 2.0)), Verdict::Outside);
        assert_eq!(eval.evaluate(&zone, Point::new(-0.5, 0.5)), Verdict::Outside);
    }

    #[test]
    fn test_convex_centroid_is_inside() {
        let ring = vec![
            Point::new(-12.10, -77.05),
            Point::new(-12.10, -77.00),
            Point::new(-12.05, -76.98),
            Point::new(-12.02, -77.02),
            Point::new(-12.06, -77.07),
        ];
        let n = ring.len() as f64;
        let centroid = Point::new(
            ring.iter().map(|p| p.lat).sum::<f64>() / n,
            ring.iter().map(|p| p.lon).sum::<f64>() / n,
        );
        let zone = Zone::polygonal(ZoneId(9), ring).unwrap();
        let eval = MembershipEvaluator::new();
        assert!(eval.evaluate(&zone, centroid).is_inside());
        assert!(!eval.evaluate(&zone, Point::new(10.0, 10.0)).is_inside());
    }

    #[test]
    fn test_concave_notch_is_outside() {
        // U shape open to the north: the notch interior is outside
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 3.0),
            Point::new(3.0, 3.0),
            Point::new(3.0, 2.0),
            Point::new(1.0, 2.0),
            Point::new(1.0, 1.0),
            Point::new(3.0, 1.0),
            Point::new(3.0, 0.0),
        ];
        let zone = Zone::polygonal(ZoneId(2), ring).unwrap();
        let eval = MembershipEvaluator::new();
        assert!(!eval.evaluate(&zone, Point::new(2.0, 1.5)).is_inside());
        assert!(eval.evaluate(&zone, Point::new(0.5, 1.5)).is_inside());
        assert!(eval.evaluate(&zone, Point::new(2.0, 0.5)).is_inside());
    }

    #[test]
    fn test_polyline_on_segment_is_inside() {
        let path = vec![Point::new(0.0, 0.0), Point::new(0.0, 1.0)];
        let zone = Zone::polyline(ZoneId(5), path, 0.0).unwrap();
        assert!(MembershipEvaluator::new().evaluate(&zone, Point::new(0.0, 0.4)).is_inside());
    }

    #[test]
    fn test_polyline_threshold_boundary() {
        let threshold = 50.0;
        let path = vec![Point::new(0.0, 0.0), Point::new(0.0, 1.0)];
        let zone = Zone::polyline(ZoneId(5), path, threshold).unwrap();
        let eval = MembershipEvaluator::new();

        let near = Point::new(meters_to_lat_degrees(threshold - 0.01), 0.5);
        let far = Point::new(meters_to_lat_degrees(threshold + 0.01), 0.5);
        assert_eq!(eval.evaluate(&zone, near), Verdict::Inside);
        assert_eq!(eval.evaluate(&zone, far), Verdict::Outside);
    }

    #[test]
    fn test_polyline_checks_every_segment() {
        let path = vec![Point::new(0.0, 0.0), Point::new(0.0, 1.0), Point::new(1.0, 1.0)];
        let zone = Zone::polyline(ZoneId(6), path, 50.0).unwrap();
        // Close to the second (north-running) segment only
        let p = Point::new(0.5, 1.0 + meters_to_lat_degrees(20.0));
        assert!(MembershipEvaluator::new().evaluate(&zone, p).is_inside());
    }

    #[test]
    fn test_undefined_center_is_not_inside() {
        let zone = Zone {
            id: ZoneId(4),
            geometry: ZoneGeometry::Circular { center: None, radius_m: 50.0 },
        };
        let verdict = MembershipEvaluator::new().evaluate(&zone, Point::new(0.0, 0.0));
        assert_eq!(verdict, Verdict::UndefinedCenter);
        assert!(!verdict.is_inside());
    }

    #[test]
    fn test_circle_without_coordinates_is_rejected() {
        let raw = RawZone { id: ZoneId(4), shape_code: 1, coordinates: vec![], radius: 50.0 };
        let result = MembershipEvaluator::new().evaluate_raw(&raw, Point::new(0.0, 0.0), 50.0);
        assert!(matches!(
            result,
            Err(ZoneError::MalformedGeometry(GeometryFault::TooFewPoints { found: 0, .. }))
        ));
    }

    #[test]
    fn test_degenerate_ring_contains_nothing() {
        for ring in [vec![], vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]] {
            let zone = Zone { id: ZoneId(9), geometry: ZoneGeometry::Polygonal { ring } };
            assert_eq!(MembershipEvaluator::new().evaluate(&zone, Point::new(0.5, 0.5)), Verdict::Outside);
        }
    }

    #[test]
    fn test_evaluate_raw_rejects_bad_zones() {
        let eval = MembershipEvaluator::new();
        let unsupported = RawZone { id: ZoneId(1), shape_code: 7, coordinates: vec![0.0, 0.0], radius: 1.0 };
        assert_eq!(
            eval.evaluate_raw(&unsupported, Point::new(0.0, 0.0), 50.0),
            Err(ZoneError::UnsupportedShape(7))
        );

        let odd = RawZone { id: ZoneId(2), shape_code: 2, coordinates: vec![0.0, 0.0, 1.0], radius: 0.0 };
        assert_eq!(
            eval.evaluate_raw(&odd, Point::new(0.0, 0.0), 50.0),
            Err(ZoneError::MalformedGeometry(GeometryFault::OddCoordinateCount(3)))
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_circle_agrees_with_haversine(
                lat in -60.0..60.0_f64,
                lon in -170.0..170.0_f64,
                dlat in -0.01..0.01_f64,
                dlon in -0.01..0.01_f64,
                radius in 1.0..5000.0_f64,
            ) {
                let center = Point::new(lat, lon);
                let p = Point::new(lat + dlat, lon + dlon);
                let zone = Zone::circular(ZoneId(1), center, radius).unwrap();
                let inside = MembershipEvaluator::new().evaluate(&zone, p).is_inside();
                prop_assert_eq!(inside, haversine_distance(center, p) <= radius);
            }

            #[test]
            fn test_far_points_are_outside_unit_square(
                lat in 1.5..80.0_f64,
                lon in -170.0..170.0_f64,
            ) {
                let zone = unit_square();
                prop_assert!(!MembershipEvaluator::new().evaluate(&zone, Point::new(lat, lon)).is_inside());
            }
        }
    }
}
