//! Spatial query utilities for distance calculations.
//!
//! Uses Haversine formula on a spherical Earth. Points follow the `geo`
//! convention: `x` is longitude, `y` is latitude, both in decimal degrees.

use geo::Point;

use crate::models::types::{Result, TrackingError};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Build a point from latitude/longitude, rejecting impossible coordinates.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Point> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(TrackingError::InvalidInput(format!(
            "coordinates must be finite (lat {latitude}, lng {longitude})"
        )));
    }
    if latitude.abs() > 90.0 {
        return Err(TrackingError::InvalidInput(format!(
            "latitude {latitude} out of range [-90, 90]"
        )));
    }
    if longitude.abs() > 180.0 {
        return Err(TrackingError::InvalidInput(format!(
            "longitude {longitude} out of range [-180, 180]"
        )));
    }
    Ok(Point::new(longitude, latitude))
}

/// Calculate Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let d_lat = (p2.y() - p1.y()).to_radians();
    let d_lng = (p2.x() - p1.x()).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Initial great-circle bearing from `from` towards `to`, in degrees.
///
/// Normalized to `[0, 360)` where 0 is north and 90 is east.
pub fn initial_bearing(from: Point, to: Point) -> f64 {
    let lat1 = from.y().to_radians();
    let lat2 = to.y().to_radians();
    let d_lng = (to.x() - from.x()).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Straight-line travel time for a distance at a constant speed.
pub fn estimate_travel_seconds(distance_m: f64, speed_kmh: f64) -> f64 {
    if speed_kmh <= 0.0 {
        return f64::INFINITY;
    }
    distance_m / (speed_kmh * 1000.0 / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(lat: f64, lng: f64) -> Point {
        validate_coordinates(lat, lng).unwrap()
    }

    #[test]
    fn test_haversine_known_value() {
        let a = point(-15.7942, -47.8822);
        let b = point(-15.8000, -47.8900);

        // Reference computed independently for R = 6371 km
        let reference = 1_054.7;
        let dist = haversine_distance(a, b);
        assert!((dist - reference).abs() / reference < 0.05, "got {dist}");
    }

    #[test]
    fn test_haversine_symmetry() {
        let pairs = [
            (point(40.7128, -74.0060), point(34.0522, -118.2437)),
            (point(0.0, 0.0), point(0.0, 0.01)),
            (point(-33.8688, 151.2093), point(51.5074, -0.1278)),
        ];

        for (a, b) in pairs {
            assert_relative_eq!(haversine_distance(a, b), haversine_distance(b, a));
        }
    }

    #[test]
    fn test_haversine_self_distance() {
        let a = point(-15.7942, -47.8822);
        assert_eq!(haversine_distance(a, a), 0.0);
    }

    #[test]
    fn test_haversine_nyc_la() {
        // Distance from NYC to LA is approximately 3,936 km
        let dist = haversine_distance(point(40.7128, -74.0060), point(34.0522, -118.2437));
        assert!((dist - 3_936_000.0).abs() < 50_000.0);
    }

    #[test]
    fn test_equator_hundredth_degree() {
        // 0.01 degrees of longitude at the equator is ~1112 m
        let dist = haversine_distance(point(0.0, 0.0), point(0.0, 0.01));
        assert_relative_eq!(dist, 1_111.95, epsilon = 0.5);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(validate_coordinates(90.1, 0.0).is_err());
        assert!(validate_coordinates(-91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, 180.5).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
        assert!(validate_coordinates(90.0, -180.0).is_ok());
    }

    #[test]
    fn test_initial_bearing_cardinals() {
        let origin = point(0.0, 0.0);
        assert_relative_eq!(initial_bearing(origin, point(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(origin, point(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(origin, point(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing(origin, point(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_estimate_travel_seconds() {
        // 30 km/h covers 500 m in 60 s
        assert_relative_eq!(estimate_travel_seconds(500.0, 30.0), 60.0, epsilon = 1e-9);
        assert!(estimate_travel_seconds(500.0, 0.0).is_infinite());
    }
}
