use std::sync::Arc;

use fleet_tracking::prelude::*;

use crate::config::{ConfigError, TrackingConfig};
use crate::optimizer::RouteOptimizer;
use crate::proximity::ProximityService;

pub mod config;
pub mod mapping;
pub mod optimizer;
pub mod proximity;
pub mod storage;

// Re-export the domain crate
pub use fleet_tracking as tracking;

/// The two request-facing services, wired to one store
#[derive(Clone)]
pub struct TrackingServices {
    pub optimizer: RouteOptimizer,
    pub proximity: ProximityService,
}

impl TrackingServices {
    pub fn new<S>(config: &TrackingConfig, store: Arc<S>) -> Result<Self, ConfigError>
    where
        S: StopSource + VisitedStopLog + NotificationLedger + PlanStore + 'static,
    {
        config.validate()?;

        let cache = OptimizationCache::new(store.clone(), config.cache_freshness);
        let optimizer = RouteOptimizer::new(store.clone(), config.mapping_provider()?, cache);
        let proximity = ProximityService::new(store.clone(), store.clone(), store)
            .with_default_threshold(config.default_threshold_m)?
            .with_notification_ttl(config.notification_ttl);

        Ok(Self {
            optimizer,
            proximity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_services_share_one_store() {
        let store = Arc::new(storage::SqliteTrackingStore::open_in_memory().unwrap());
        store
            .upsert_stops(&[
                Stop::new("A", "r1", 0, 0.0, 0.0).unwrap(),
                Stop::new("B", "r1", 1, 0.0, 0.01).unwrap(),
                Stop::new("C", "r1", 2, 0.0, 0.02).unwrap(),
            ])
            .unwrap();

        let services = TrackingServices::new(&TrackingConfig::default(), store.clone()).unwrap();

        let outcome = services.optimizer.optimize(&"r1".into(), None).await.unwrap();
        assert!(outcome.optimized);
        assert!(store.load_plan(&"r1".into()).unwrap().is_some());

        let position =
            VehiclePosition::new("t1", "v1", "r1", 0.0, 0.0099, chrono::Utc::now()).unwrap();
        assert!(services.proximity.check(&position, None).unwrap().should_notify);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let store = Arc::new(MemoryTrackingStore::new());
        let config = TrackingConfig {
            default_threshold_m: 0.0,
            ..Default::default()
        };
        assert!(TrackingServices::new(&config, store).is_err());
    }
}
