//! Coordinate helpers shared by the compressor, the factory, and the
//! spatial index.

use geo::HaversineDistance;
use geo::Point;

pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2)
}

/// Angle of the turn first → via → third in degrees, in [0, 360), where 180
/// is straight through. Uses an equirectangular projection around the via
/// node, which is plenty for turn classification.
pub fn turn_angle(first: (f64, f64), via: (f64, f64), third: (f64, f64)) -> f64 {
    let scale = via.0.to_radians().cos();
    let v1 = (
        (first.1 - via.1) * scale,
        first.0 - via.0,
    );
    let v2 = (
        (third.1 - via.1) * scale,
        third.0 - via.0,
    );
    let mut angle = (v2.1.atan2(v2.0) - v1.1.atan2(v1.0)).to_degrees();
    while angle < 0.0 {
        angle += 360.0;
    }
    while angle >= 360.0 {
        angle -= 360.0;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_roughly_right() {
        // One degree of longitude at the equator is ~111 km.
        let d = haversine_meters(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 500.0);
    }

    #[test]
    fn straight_through_is_180() {
        let angle = turn_angle((0.0, 0.0), (0.0, 1.0), (0.0, 2.0));
        assert!((angle - 180.0).abs() < 1.0);
    }

    #[test]
    fn right_angle_turns() {
        let left = turn_angle((0.0, 0.0), (0.0, 1.0), (1.0, 1.0));
        let right = turn_angle((0.0, 0.0), (0.0, 1.0), (-1.0, 1.0));
        assert!((left - 90.0).abs() < 1.0 || (left - 270.0).abs() < 1.0);
        assert!(((left + right) - 360.0).abs() < 2.0);
    }

    #[test]
    fn u_turn_is_near_zero() {
        let angle = turn_angle((0.0, 0.0), (0.0, 1.0), (0.0, 0.0));
        assert!(angle < 1.0 || angle > 359.0);
    }
}
