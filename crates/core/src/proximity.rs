//! Proximity service.
//!
//! Runs one vehicle position through the whole pipeline: load the route's
//! stops, drop the ones already visited on this trip, measure, pick the
//! nearest and let the throttle decide whether dispatch should be alerted.

use std::sync::Arc;

use fleet_tracking::proximity::validate_threshold;
use fleet_tracking::prelude::*;
use tracing::{debug, warn};

pub const ALL_STOPS_VISITED: &str = "all stops already visited";

/// Outcome of one proximity check
#[derive(Clone, Debug, PartialEq)]
pub struct ProximityReport {
    /// Whether any pending stop is within the threshold
    pub nearby: bool,
    pub nearest_stop: Option<NearestStop>,
    pub checks: Vec<ProximityCheck>,
    pub should_notify: bool,
    pub notify_reason: Option<NotifyReason>,
    /// Stop the notification decision is about
    pub notify_stop: Option<StopIdentifier>,
    pub message: Option<String>,
}

impl ProximityReport {
    fn empty(message: Option<&str>) -> Self {
        Self {
            nearby: false,
            nearest_stop: None,
            checks: Vec::new(),
            should_notify: false,
            notify_reason: None,
            notify_stop: None,
            message: message.map(str::to_owned),
        }
    }
}

#[derive(Clone)]
pub struct ProximityService {
    stops: Arc<dyn StopSource>,
    visited: Arc<dyn VisitedStopLog>,
    ledger: Arc<dyn NotificationLedger>,
    default_threshold_m: f64,
    notification_ttl: Option<chrono::Duration>,
}

impl ProximityService {
    pub fn new(
        stops: Arc<dyn StopSource>,
        visited: Arc<dyn VisitedStopLog>,
        ledger: Arc<dyn NotificationLedger>,
    ) -> Self {
        Self {
            stops,
            visited,
            ledger,
            default_threshold_m: DEFAULT_THRESHOLD_METERS,
            notification_ttl: None,
        }
    }

    pub fn with_default_threshold(mut self, threshold_m: f64) -> Result<Self> {
        self.default_threshold_m = validate_threshold(threshold_m)?;
        Ok(self)
    }

    /// Let a sent notification expire after `ttl`. `None` keeps it for the
    /// lifetime of the trip.
    pub fn with_notification_ttl(mut self, ttl: Option<chrono::Duration>) -> Self {
        self.notification_ttl = ttl;
        self
    }

    pub fn default_threshold_m(&self) -> f64 {
        self.default_threshold_m
    }

    pub fn check(
        &self,
        position: &VehiclePosition,
        threshold_m: Option<f64>,
    ) -> Result<ProximityReport> {
        let threshold_m = validate_threshold(threshold_m.unwrap_or(self.default_threshold_m))?;

        let all = self.stops.route_stops(&position.route_id)?;
        if all.is_empty() {
            debug!(route_id = %position.route_id, "route has no stops");
            return Ok(ProximityReport::empty(None));
        }

        let visited = self.visited.visited_stops(&position.trip_id)?;
        let pending = pending_stops(all, &visited);
        if pending.is_empty() {
            debug!(trip_id = %position.trip_id, "every stop visited");
            return Ok(ProximityReport::empty(Some(ALL_STOPS_VISITED)));
        }

        let checks = check_proximity(position, &pending, threshold_m)?;
        let nearest_stop = find_nearest(position, &pending);

        let since = self.notification_ttl.map(|ttl| position.timestamp - ttl);
        let notified = self.ledger.notified_stops(&position.trip_id, since)?;
        let mut prior = pairs_for_trip(&position.trip_id, notified);

        // A stop claimed by a concurrent check joins the prior set and the
        // next closest free stop is tried.
        let decision = loop {
            let decision = decide(&position.trip_id, &checks, &prior);
            let stop_id = match &decision.stop_id {
                Some(stop_id) if decision.should_notify => stop_id.clone(),
                _ => break decision,
            };

            match self
                .ledger
                .try_mark_notified(&position.trip_id, &stop_id, position.timestamp, since)
            {
                Ok(true) => break decision,
                Ok(false) => {
                    debug!(trip_id = %position.trip_id, %stop_id, "stop already claimed by another check");
                    prior.insert((position.trip_id.clone(), stop_id));
                }
                Err(e) => {
                    warn!(trip_id = %position.trip_id, %stop_id, error = %e, "failed to record notification");
                    break decision;
                }
            }
        };

        debug!(
            trip_id = %position.trip_id,
            vehicle_id = %position.vehicle_id,
            pending = pending.len(),
            should_notify = decision.should_notify,
            reason = ?decision.reason,
            "proximity checked"
        );

        Ok(ProximityReport {
            nearby: checks.iter().any(|c| c.is_within_threshold),
            nearest_stop,
            checks,
            should_notify: decision.should_notify,
            notify_reason: decision.reason,
            notify_stop: decision.stop_id,
            message: None,
        })
    }

    /// Log a trip's arrival at a stop so later checks skip it.
    pub fn record_arrival(&self, event: &VisitedStopEvent) -> Result<bool> {
        self.visited.record_arrival(event)
    }
}
