//! Geo math: distances and bearings on a spherical Earth.

pub mod queries;

pub use queries::{
    estimate_travel_seconds, haversine_distance, initial_bearing, validate_coordinates,
    EARTH_RADIUS_METERS,
};
