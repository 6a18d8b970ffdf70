//! In-memory tracking store.
//!
//! Holds route stops, optimized plans, arrivals and notification state in
//! lookup maps behind `RwLock`s. Every write is a single map operation under
//! the write lock, so upserts are atomic per key.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::identifiers::*;
use crate::models::{traits::*, types::*};

type PairKey = (TripIdentifier, StopIdentifier);

#[derive(Default)]
pub struct MemoryTrackingStore {
    stops: RwLock<HashMap<RouteIdentifier, Vec<Stop>>>,
    plans: RwLock<HashMap<RouteIdentifier, OptimizedRoutePlan>>,
    arrivals: RwLock<HashMap<PairKey, DateTime<Utc>>>,
    notifications: RwLock<HashMap<PairKey, DateTime<Utc>>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| TrackingError::Storage("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| TrackingError::Storage("memory store lock poisoned".into()))
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from raw stops, grouped by route and ordered by sequence
    pub fn from_stops(stops: Vec<Stop>) -> Self {
        let mut by_route: HashMap<RouteIdentifier, Vec<Stop>> = HashMap::new();
        for stop in stops {
            by_route.entry(stop.route_id.clone()).or_default().push(stop);
        }
        for route_stops in by_route.values_mut() {
            route_stops.sort_by_key(|s| s.sequence);
        }

        Self {
            stops: RwLock::new(by_route),
            ..Self::default()
        }
    }

    /// Replace a route's stops (route edit)
    pub fn set_route_stops(&self, route_id: &RouteIdentifier, mut stops: Vec<Stop>) -> Result<()> {
        stops.sort_by_key(|s| s.sequence);
        write(&self.stops)?.insert(route_id.clone(), stops);
        Ok(())
    }
}

impl StopSource for MemoryTrackingStore {
    fn route_stops(&self, route_id: &RouteIdentifier) -> Result<Vec<Stop>> {
        Ok(read(&self.stops)?.get(route_id).cloned().unwrap_or_default())
    }
}

impl VisitedStopLog for MemoryTrackingStore {
    fn visited_stops(&self, trip_id: &TripIdentifier) -> Result<HashSet<StopIdentifier>> {
        Ok(read(&self.arrivals)?
            .keys()
            .filter(|(trip, _)| trip == trip_id)
            .map(|(_, stop)| stop.clone())
            .collect())
    }

    fn record_arrival(&self, event: &VisitedStopEvent) -> Result<bool> {
        let mut arrivals = write(&self.arrivals)?;
        let key = (event.trip_id.clone(), event.stop_id.clone());
        if arrivals.contains_key(&key) {
            return Ok(false);
        }
        arrivals.insert(key, event.arrived_at);
        Ok(true)
    }
}

impl NotificationLedger for MemoryTrackingStore {
    fn notified_stops(
        &self,
        trip_id: &TripIdentifier,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashSet<StopIdentifier>> {
        Ok(read(&self.notifications)?
            .iter()
            .filter(|((trip, _), at)| trip == trip_id && since.map_or(true, |s| **at >= s))
            .map(|((_, stop), _)| stop.clone())
            .collect())
    }

    fn try_mark_notified(
        &self,
        trip_id: &TripIdentifier,
        stop_id: &StopIdentifier,
        at: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut notifications = write(&self.notifications)?;
        let key = (trip_id.clone(), stop_id.clone());
        if let Some(prev) = notifications.get(&key) {
            if since.map_or(true, |s| *prev >= s) {
                return Ok(false);
            }
        }
        notifications.insert(key, at);
        Ok(true)
    }
}

impl PlanStore for MemoryTrackingStore {
    fn load_plan(&self, route_id: &RouteIdentifier) -> Result<Option<OptimizedRoutePlan>> {
        Ok(read(&self.plans)?.get(route_id).cloned())
    }

    fn save_plan(&self, plan: &OptimizedRoutePlan) -> Result<()> {
        write(&self.plans)?.insert(plan.route_id.clone(), plan.clone());
        Ok(())
    }
}
