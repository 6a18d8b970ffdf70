//! Notification throttle.
//!
//! At most one notification per (trip, stop) approach. The prior state is
//! passed in explicitly; how long it lives is up to the ledger that stores it.

use std::collections::HashSet;

use crate::identifiers::{StopIdentifier, TripIdentifier};
use crate::models::types::{NotificationDecision, ProximityCheck};

pub type NotifiedPairs = HashSet<(TripIdentifier, StopIdentifier)>;

/// Decide whether a new notification should fire for this trip.
///
/// Picks the closest in-range stop not yet notified. A notification already
/// sent for one stop never suppresses a different stop.
pub fn decide(
    trip_id: &TripIdentifier,
    results: &[ProximityCheck],
    prior: &NotifiedPairs,
) -> NotificationDecision {
    let mut in_range: Vec<&ProximityCheck> =
        results.iter().filter(|c| c.is_within_threshold).collect();
    if in_range.is_empty() {
        return NotificationDecision::quiet();
    }
    in_range.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

    match in_range
        .iter()
        .find(|c| !prior.contains(&(trip_id.clone(), c.stop_id.clone())))
    {
        Some(check) => NotificationDecision::notify(check.stop_id.clone()),
        None => NotificationDecision::suppressed(in_range[0].stop_id.clone()),
    }
}

/// Lift a per-trip set of notified stops into the pair set `decide` expects.
pub fn pairs_for_trip(
    trip_id: &TripIdentifier,
    stops: impl IntoIterator<Item = StopIdentifier>,
) -> NotifiedPairs {
    stops.into_iter().map(|s| (trip_id.clone(), s)).collect()
}
