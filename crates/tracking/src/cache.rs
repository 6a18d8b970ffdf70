//! Route optimization cache.
//!
//! The one place that decides whether a stored plan is still usable. Plans
//! depend on live traffic, so they expire after a short freshness window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::identifiers::RouteIdentifier;
use crate::models::traits::PlanStore;
use crate::models::types::{OptimizedRoutePlan, Result, TrackingError};

#[derive(Clone)]
pub struct OptimizationCache {
    store: Arc<dyn PlanStore>,
    freshness_window: Duration,
}

impl OptimizationCache {
    pub const DEFAULT_FRESHNESS_MINUTES: i64 = 10;

    pub fn new(store: Arc<dyn PlanStore>, freshness_window: Duration) -> Self {
        Self {
            store,
            freshness_window,
        }
    }

    pub fn with_default_window(store: Arc<dyn PlanStore>) -> Self {
        Self::new(store, Duration::minutes(Self::DEFAULT_FRESHNESS_MINUTES))
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Fresh plan for the route, if any.
    ///
    /// Stale entries are reported as absent. Read failures propagate so the
    /// caller can decide to treat them as a miss.
    pub fn get(
        &self,
        route_id: &RouteIdentifier,
        now: DateTime<Utc>,
    ) -> Result<Option<OptimizedRoutePlan>> {
        let Some(plan) = self.store.load_plan(route_id)? else {
            return Ok(None);
        };
        if !plan.is_fresh(now, self.freshness_window) {
            debug!(%route_id, cached_at = %plan.cached_at, "cached plan expired");
            return Ok(None);
        }
        Ok(Some(plan))
    }

    /// Upsert the route's live plan.
    pub fn put(&self, plan: &OptimizedRoutePlan) -> Result<()> {
        self.store.save_plan(plan).map_err(|e| match e {
            TrackingError::CachePersistFailure(_) => e,
            other => TrackingError::CachePersistFailure(other.to_string()),
        })
    }
}
