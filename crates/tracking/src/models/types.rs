//! Core data types and enums for route tracking.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use geo::Point;
use twox_hash::XxHash64;

use crate::identifiers::*;
use crate::spatial::validate_coordinates;

/// Arrival radius used when route administration does not set one.
pub const DEFAULT_ARRIVAL_RADIUS_METERS: f64 = 50.0;

// ============================================================================
// Enums
// ============================================================================

/// Why a notification decision came out the way it did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NotifyReason {
    /// A pending stop came within threshold for the first time on this trip
    ApproachingStop,
    /// Every stop within threshold has already been notified for this trip
    AlreadyNotified,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A stop on a route, owned by route administration.
#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    pub id: StopIdentifier,
    pub route_id: RouteIdentifier,
    pub sequence: u32,
    pub location: Point,
    pub name: Option<Arc<str>>,
    pub arrival_radius_m: f64,
}

impl Stop {
    pub fn new(
        id: impl Into<StopIdentifier>,
        route_id: impl Into<RouteIdentifier>,
        sequence: u32,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self> {
        let id = id.into();
        let route_id = route_id.into();
        if id.is_blank() {
            return Err(TrackingError::InvalidInput("stop id is required".into()));
        }
        if route_id.is_blank() {
            return Err(TrackingError::InvalidInput(format!(
                "stop {id} has no route id"
            )));
        }

        Ok(Self {
            id,
            route_id,
            sequence,
            location: validate_coordinates(latitude, longitude)?,
            name: None,
            arrival_radius_m: DEFAULT_ARRIVAL_RADIUS_METERS,
        })
    }

    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(name.as_ref().into());
        self
    }

    pub fn with_arrival_radius(mut self, radius_m: f64) -> Result<Self> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(TrackingError::InvalidInput(format!(
                "arrival radius must be positive, got {radius_m}"
            )));
        }
        self.arrival_radius_m = radius_m;
        Ok(self)
    }

    pub fn latitude(&self) -> f64 {
        self.location.y()
    }

    pub fn longitude(&self) -> f64 {
        self.location.x()
    }
}

/// Latest GPS fix for a vehicle running a trip
#[derive(Clone, Debug, PartialEq)]
pub struct VehiclePosition {
    pub trip_id: TripIdentifier,
    pub vehicle_id: VehicleIdentifier,
    pub route_id: RouteIdentifier,
    pub location: Point,
    pub timestamp: DateTime<Utc>,
}

impl VehiclePosition {
    pub fn new(
        trip_id: impl Into<TripIdentifier>,
        vehicle_id: impl Into<VehicleIdentifier>,
        route_id: impl Into<RouteIdentifier>,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let trip_id = trip_id.into();
        let vehicle_id = vehicle_id.into();
        let route_id = route_id.into();

        for (field, blank) in [
            ("tripId", trip_id.is_blank()),
            ("vehicleId", vehicle_id.is_blank()),
            ("routeId", route_id.is_blank()),
        ] {
            if blank {
                return Err(TrackingError::InvalidInput(format!("{field} is required")));
            }
        }

        Ok(Self {
            trip_id,
            vehicle_id,
            route_id,
            location: validate_coordinates(latitude, longitude)?,
            timestamp,
        })
    }
}

/// One entry of an optimized visiting order
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlannedStop {
    pub stop_id: StopIdentifier,
    pub sequence: u32,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Stop> for PlannedStop {
    fn from(stop: &Stop) -> Self {
        Self {
            stop_id: stop.id.clone(),
            sequence: stop.sequence,
            latitude: stop.latitude(),
            longitude: stop.longitude(),
        }
    }
}

/// The live optimized order for a route.
///
/// The first and last entries of `stops` are always the first and last
/// stops of the input, whatever the provider did with the interior.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizedRoutePlan {
    pub route_id: RouteIdentifier,
    pub stops: Vec<PlannedStop>,
    /// Seconds from trip start at which each stop is expected
    pub etas: BTreeMap<StopIdentifier, u32>,
    pub total_duration_seconds: Option<u32>,
    pub total_distance_meters: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub used_live_traffic: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub polyline: Option<String>,
    /// Hash of the ordered input stops this plan was computed from
    pub stops_fingerprint: u64,
    pub cached_at: DateTime<Utc>,
}

impl OptimizedRoutePlan {
    /// A plan is fresh while strictly younger than the window.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.cached_at < window
    }
}

/// Arrival of a trip at a stop. The first event for a pair is permanent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitedStopEvent {
    pub trip_id: TripIdentifier,
    pub stop_id: StopIdentifier,
    pub arrived_at: DateTime<Utc>,
}

/// Distance from a vehicle to one pending stop
#[derive(Clone, Debug, PartialEq)]
pub struct ProximityCheck {
    pub stop_id: StopIdentifier,
    pub stop_name: Option<Arc<str>>,
    pub stop_sequence: u32,
    pub distance_m: f64,
    pub is_within_threshold: bool,
    pub threshold_m: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NearestStop {
    pub stop_id: StopIdentifier,
    pub distance_m: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationDecision {
    pub should_notify: bool,
    pub reason: Option<NotifyReason>,
    /// Stop the decision is about, if any stop was in range
    pub stop_id: Option<StopIdentifier>,
}

impl NotificationDecision {
    pub fn notify(stop_id: StopIdentifier) -> Self {
        Self {
            should_notify: true,
            reason: Some(NotifyReason::ApproachingStop),
            stop_id: Some(stop_id),
        }
    }

    pub fn suppressed(stop_id: StopIdentifier) -> Self {
        Self {
            should_notify: false,
            reason: Some(NotifyReason::AlreadyNotified),
            stop_id: Some(stop_id),
        }
    }

    pub fn quiet() -> Self {
        Self {
            should_notify: false,
            reason: None,
            stop_id: None,
        }
    }
}

/// Fingerprint of an ordered stop list.
///
/// Any edit to ids, order or coordinates changes the value.
pub fn stops_fingerprint(stops: &[Stop]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for stop in stops {
        hasher.write(stop.id.as_str().as_bytes());
        hasher.write_u8(0xff);
        hasher.write_u32(stop.sequence);
        hasher.write_u64(stop.latitude().to_bits());
        hasher.write_u64(stop.longitude().to_bits());
    }
    hasher.finish()
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Route {route_id} has {found} stop(s), at least 2 are required")]
    InsufficientStops {
        route_id: RouteIdentifier,
        found: usize,
    },

    #[error("Mapping provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Failed to persist optimized plan: {0}")]
    CachePersistFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T, E = TrackingError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_validation() {
        let stop = Stop::new("s1", "r1", 0, -15.79, -47.88).unwrap();
        assert_eq!(stop.arrival_radius_m, DEFAULT_ARRIVAL_RADIUS_METERS);
        assert_eq!(stop.latitude(), -15.79);
        assert_eq!(stop.longitude(), -47.88);

        assert!(Stop::new("", "r1", 0, 0.0, 0.0).is_err());
        assert!(Stop::new("s1", "r1", 0, 95.0, 0.0).is_err());
        assert!(stop.clone().with_arrival_radius(0.0).is_err());
        assert_eq!(stop.with_arrival_radius(80.0).unwrap().arrival_radius_m, 80.0);
    }

    #[test]
    fn test_vehicle_position_requires_ids() {
        let now = Utc::now();
        assert!(VehiclePosition::new("t1", "v1", "r1", 0.0, 0.0, now).is_ok());
        assert!(VehiclePosition::new("", "v1", "r1", 0.0, 0.0, now).is_err());
        assert!(VehiclePosition::new("t1", "v1", " ", 0.0, 0.0, now).is_err());
        assert!(VehiclePosition::new("t1", "v1", "r1", 0.0, 181.0, now).is_err());
    }

    #[test]
    fn test_plan_freshness_window() {
        let cached_at = Utc::now();
        let plan = OptimizedRoutePlan {
            route_id: "r1".into(),
            stops: vec![],
            etas: BTreeMap::new(),
            total_duration_seconds: None,
            total_distance_meters: None,
            used_live_traffic: false,
            polyline: None,
            stops_fingerprint: 0,
            cached_at,
        };
        let window = Duration::minutes(10);

        assert!(plan.is_fresh(cached_at + Duration::minutes(9), window));
        assert!(!plan.is_fresh(cached_at + Duration::minutes(10), window));
    }

    #[test]
    fn test_fingerprint_tracks_edits() {
        let a = Stop::new("a", "r1", 0, 0.0, 0.0).unwrap();
        let b = Stop::new("b", "r1", 1, 0.0, 0.01).unwrap();
        let moved = Stop::new("b", "r1", 1, 0.0, 0.02).unwrap();

        let original = stops_fingerprint(&[a.clone(), b.clone()]);
        assert_eq!(original, stops_fingerprint(&[a.clone(), b.clone()]));
        assert_ne!(original, stops_fingerprint(&[b.clone(), a.clone()]));
        assert_ne!(original, stops_fingerprint(&[a, moved]));
    }

    #[test]
    fn test_notify_reason_codes() {
        assert_eq!(NotifyReason::ApproachingStop.as_ref(), "approaching_stop");
        assert_eq!(NotifyReason::AlreadyNotified.to_string(), "already_notified");
    }
}
