//! Storage traits for tracking state.
//!
//! These traits define the narrow interfaces this subsystem needs from
//! persistence. Implementations can be in-memory or database-backed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::identifiers::*;
use crate::models::types::*;

/// Source of administered route stops (read-only for this subsystem)
pub trait StopSource: Send + Sync {
    /// All stops of a route, ordered by sequence index
    fn route_stops(&self, route_id: &RouteIdentifier) -> Result<Vec<Stop>>;
}

/// Append-only log of "arrived at stop" events per trip
pub trait VisitedStopLog: Send + Sync {
    fn visited_stops(&self, trip_id: &TripIdentifier) -> Result<HashSet<StopIdentifier>>;

    /// Record an arrival. Returns `false` if the pair was already logged,
    /// in which case the original event is kept.
    fn record_arrival(&self, event: &VisitedStopEvent) -> Result<bool>;
}

/// Durable record of stops a trip has already been notified about
pub trait NotificationLedger: Send + Sync {
    /// Stops notified for the trip at or after `since` (all of them when `None`)
    fn notified_stops(
        &self,
        trip_id: &TripIdentifier,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashSet<StopIdentifier>>;

    /// Claim a pair for notification at `at`.
    ///
    /// Succeeds when the pair has no entry, or when its entry is older than
    /// `since` (never, when `since` is `None`). Check and write happen as one
    /// atomic step, so of several concurrent claims at most one returns `true`.
    fn try_mark_notified(
        &self,
        trip_id: &TripIdentifier,
        stop_id: &StopIdentifier,
        at: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool>;
}

/// Key-value persistence for optimized plans, one live plan per route
pub trait PlanStore: Send + Sync {
    fn load_plan(&self, route_id: &RouteIdentifier) -> Result<Option<OptimizedRoutePlan>>;

    /// Atomic upsert keyed by `plan.route_id`
    fn save_plan(&self, plan: &OptimizedRoutePlan) -> Result<()>;
}
