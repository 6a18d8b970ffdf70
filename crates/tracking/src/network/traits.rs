//! Pluggable mapping provider traits.
//!
//! External crates implement these to provide waypoint optimization backed
//! by a routing service.

use std::future::Future;
use std::pin::Pin;

use geo::Point;

use crate::models::types::Result;

/// Answer of a mapping provider for one optimization request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WaypointOrder {
    /// Visiting order of the interior waypoints, as indices into the input
    pub ordered_indices: Vec<usize>,
    /// Duration of each leg in visiting order, `interior.len() + 1` entries
    /// (or none when the provider has no timing)
    pub leg_durations_seconds: Vec<u32>,
    pub total_distance_meters: Option<f64>,
    /// Leg durations account for current traffic
    pub used_live_traffic: bool,
    /// Encoded overview polyline of the whole route
    pub polyline: Option<String>,
}

impl WaypointOrder {
    pub fn identity(len: usize) -> Self {
        Self {
            ordered_indices: (0..len).collect(),
            ..Self::default()
        }
    }

    /// Whether this answer can be applied to `interior_len` waypoints
    pub fn is_consistent_with(&self, interior_len: usize) -> bool {
        if self.ordered_indices.len() != interior_len {
            return false;
        }
        let mut seen = vec![false; interior_len];
        for &idx in &self.ordered_indices {
            if idx >= interior_len || seen[idx] {
                return false;
            }
            seen[idx] = true;
        }
        self.leg_durations_seconds.is_empty()
            || self.leg_durations_seconds.len() == interior_len + 1
    }
}

/// Reorders interior waypoints between fixed endpoints.
///
/// Failures of any kind (network, status, malformed body, timeout) are
/// reported as `TrackingError::ProviderUnavailable`. Calls must be safe to
/// retry.
pub trait MappingProvider: Send + Sync {
    fn optimize_waypoints<'a>(
        &'a self,
        origin: Point,
        destination: Point,
        interior: &'a [Point],
    ) -> Pin<Box<dyn Future<Output = Result<WaypointOrder>> + Send + 'a>>;
}
