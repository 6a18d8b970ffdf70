//! Proximity detection between a vehicle and the stops it has yet to visit.

use std::collections::HashSet;

use crate::identifiers::StopIdentifier;
use crate::models::types::*;
use crate::spatial::haversine_distance;

/// Used when a request does not carry its own threshold.
pub const DEFAULT_THRESHOLD_METERS: f64 = 500.0;

pub fn validate_threshold(threshold_m: f64) -> Result<f64> {
    if !threshold_m.is_finite() || threshold_m <= 0.0 {
        return Err(TrackingError::InvalidInput(format!(
            "threshold must be a positive number of meters, got {threshold_m}"
        )));
    }
    Ok(threshold_m)
}

/// Stops of the route not yet visited on this trip, in route order.
pub fn pending_stops(all: Vec<Stop>, visited: &HashSet<StopIdentifier>) -> Vec<Stop> {
    all.into_iter().filter(|s| !visited.contains(&s.id)).collect()
}

/// Distance to every pending stop, flagged against an inclusive threshold.
pub fn check_proximity(
    position: &VehiclePosition,
    pending: &[Stop],
    threshold_m: f64,
) -> Result<Vec<ProximityCheck>> {
    let threshold_m = validate_threshold(threshold_m)?;

    Ok(pending
        .iter()
        .map(|stop| {
            let distance_m = haversine_distance(position.location, stop.location);
            ProximityCheck {
                stop_id: stop.id.clone(),
                stop_name: stop.name.clone(),
                stop_sequence: stop.sequence,
                distance_m,
                is_within_threshold: distance_m <= threshold_m,
                threshold_m,
            }
        })
        .collect())
}

/// Closest pending stop regardless of threshold.
pub fn find_nearest(position: &VehiclePosition, pending: &[Stop]) -> Option<NearestStop> {
    pending
        .iter()
        .map(|stop| NearestStop {
            stop_id: stop.id.clone(),
            distance_m: haversine_distance(position.location, stop.location),
        })
        .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
}
