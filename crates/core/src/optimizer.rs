//! Route optimizer.
//!
//! Loads a route's stops, serves a fresh cached plan when one matches the
//! current stops, and otherwise asks the mapping provider for a new order.
//! Optimization is best-effort: when the provider fails the stops come back
//! in their administered order and the cache is left alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use fleet_tracking::prelude::*;
use itertools::Itertools;
use tracing::{debug, info, warn};

/// Result envelope of one optimization request
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationOutcome {
    /// Ordered stops and ETAs. In degraded mode the order is the original
    /// sequence order and `etas` is empty.
    pub plan: OptimizedRoutePlan,
    pub optimized: bool,
    pub cached: bool,
    /// Whether a freshly computed plan reached the cache
    pub persisted: bool,
}

#[derive(Clone)]
pub struct RouteOptimizer {
    stops: Arc<dyn StopSource>,
    provider: Arc<dyn MappingProvider>,
    cache: OptimizationCache,
}

impl RouteOptimizer {
    pub fn new(
        stops: Arc<dyn StopSource>,
        provider: Arc<dyn MappingProvider>,
        cache: OptimizationCache,
    ) -> Self {
        Self {
            stops,
            provider,
            cache,
        }
    }

    /// Optimize the route's stored stops, or `explicit_stops` when given.
    pub async fn optimize(
        &self,
        route_id: &RouteIdentifier,
        explicit_stops: Option<Vec<Stop>>,
    ) -> Result<OptimizationOutcome> {
        if route_id.is_blank() {
            return Err(TrackingError::InvalidInput("routeId is required".into()));
        }

        let stops = match explicit_stops {
            Some(mut stops) => {
                stops.sort_by_key(|s| s.sequence);
                stops
            }
            None => {
                let source = self.stops.clone();
                let id = route_id.clone();
                blocking(move || source.route_stops(&id)).await?
            }
        };
        if let Some(duplicate) = stops.iter().map(|s| &s.id).duplicates().next() {
            return Err(TrackingError::InvalidInput(format!(
                "stop id {duplicate} appears more than once"
            )));
        }
        if stops.len() < 2 {
            return Err(TrackingError::InsufficientStops {
                route_id: route_id.clone(),
                found: stops.len(),
            });
        }

        let now = Utc::now();
        let fingerprint = stops_fingerprint(&stops);

        let cache = self.cache.clone();
        let id = route_id.clone();
        match blocking(move || cache.get(&id, now)).await {
            Ok(Some(plan)) if plan.stops_fingerprint == fingerprint => {
                debug!(%route_id, "serving cached plan");
                return Ok(OptimizationOutcome {
                    plan,
                    optimized: true,
                    cached: true,
                    persisted: true,
                });
            }
            Ok(Some(_)) => debug!(%route_id, "stops changed since the plan was cached"),
            Ok(None) => {}
            Err(e) => warn!(%route_id, error = %e, "plan cache unreadable, recomputing"),
        }

        let origin = &stops[0];
        let destination = &stops[stops.len() - 1];
        let interior = &stops[1..stops.len() - 1];
        let interior_points: Vec<Point> = interior.iter().map(|s| s.location).collect();

        let order = match self
            .provider
            .optimize_waypoints(origin.location, destination.location, &interior_points)
            .await
        {
            Ok(order) if order.is_consistent_with(interior.len()) => order,
            Ok(order) => {
                warn!(
                    %route_id,
                    returned = order.ordered_indices.len(),
                    expected = interior.len(),
                    "mapping provider answer does not fit the route, using original order"
                );
                return Ok(degraded(route_id, &stops, fingerprint, now));
            }
            Err(e) => {
                warn!(%route_id, error = %e, "route optimization unavailable, using original order");
                return Ok(degraded(route_id, &stops, fingerprint, now));
            }
        };

        let mut ordered: Vec<&Stop> = Vec::with_capacity(stops.len());
        ordered.push(origin);
        ordered.extend(order.ordered_indices.iter().map(|&i| &interior[i]));
        ordered.push(destination);

        let mut etas = BTreeMap::new();
        etas.insert(origin.id.clone(), 0);
        let mut elapsed: u32 = 0;
        for (stop, leg) in ordered.iter().skip(1).zip(&order.leg_durations_seconds) {
            elapsed = elapsed.saturating_add(*leg);
            etas.insert(stop.id.clone(), elapsed);
        }

        let plan = OptimizedRoutePlan {
            route_id: route_id.clone(),
            stops: ordered.iter().map(|s| PlannedStop::from(*s)).collect(),
            etas,
            total_duration_seconds: (!order.leg_durations_seconds.is_empty()).then_some(elapsed),
            total_distance_meters: order.total_distance_meters,
            used_live_traffic: order.used_live_traffic,
            polyline: order.polyline,
            stops_fingerprint: fingerprint,
            cached_at: now,
        };

        let cache = self.cache.clone();
        let to_store = plan.clone();
        let persisted = match blocking(move || cache.put(&to_store)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%route_id, error = %e, "optimized plan not cached, next request recomputes");
                false
            }
        };

        info!(%route_id, stops = plan.stops.len(), total_duration = ?plan.total_duration_seconds, "route optimized");
        Ok(OptimizationOutcome {
            plan,
            optimized: true,
            cached: false,
            persisted,
        })
    }
}

/// Run a store call on the blocking pool; stores hold synchronous locks.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TrackingError::Storage(format!("store task failed: {e}")))?
}

fn degraded(
    route_id: &RouteIdentifier,
    stops: &[Stop],
    fingerprint: u64,
    now: chrono::DateTime<Utc>,
) -> OptimizationOutcome {
    OptimizationOutcome {
        plan: OptimizedRoutePlan {
            route_id: route_id.clone(),
            stops: stops.iter().map(PlannedStop::from).collect(),
            etas: BTreeMap::new(),
            total_duration_seconds: None,
            total_distance_meters: None,
            used_live_traffic: false,
            polyline: None,
            stops_fingerprint: fingerprint,
            cached_at: now,
        },
        optimized: false,
        cached: false,
        persisted: false,
    }
}
