use std::sync::Arc;
use std::time::Duration;

use fleet_tracking::network::MappingProvider;
use fleet_tracking::provider::HeuristicProvider;
use fleet_tracking::proximity::DEFAULT_THRESHOLD_METERS;
use fleet_tracking::cache::OptimizationCache;
use tracing::info;

use crate::mapping::GoogleDirectionsClient;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("provider timeout must be between 1 and 60 seconds, got {0:?}")]
    ProviderTimeout(Duration),

    #[error("cache freshness window must be positive, got {0} minutes")]
    FreshnessWindow(i64),

    #[error("default proximity threshold must be a positive number of meters, got {0}")]
    Threshold(f64),

    #[error("notification ttl must be positive, got {0} minutes")]
    NotificationTtl(i64),

    #[error("mapping provider setup failed: {0}")]
    Provider(#[from] fleet_tracking::TrackingError),
}

/// Runtime knobs for the tracking services
#[derive(Clone, Debug)]
pub struct TrackingConfig {
    pub google_maps_api_key: Option<String>,
    pub provider_timeout: Duration,
    pub cache_freshness: chrono::Duration,
    pub default_threshold_m: f64,
    /// How long a sent notification keeps suppressing the same (trip, stop).
    /// `None` means for the lifetime of the trip.
    pub notification_ttl: Option<chrono::Duration>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            google_maps_api_key: None,
            provider_timeout: Duration::from_secs(8),
            cache_freshness: chrono::Duration::minutes(OptimizationCache::DEFAULT_FRESHNESS_MINUTES),
            default_threshold_m: DEFAULT_THRESHOLD_METERS,
            notification_ttl: None,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_timeout < Duration::from_secs(1) || self.provider_timeout > Duration::from_secs(60) {
            return Err(ConfigError::ProviderTimeout(self.provider_timeout));
        }
        if self.cache_freshness <= chrono::Duration::zero() {
            return Err(ConfigError::FreshnessWindow(self.cache_freshness.num_minutes()));
        }
        if !self.default_threshold_m.is_finite() || self.default_threshold_m <= 0.0 {
            return Err(ConfigError::Threshold(self.default_threshold_m));
        }
        if let Some(ttl) = self.notification_ttl {
            if ttl <= chrono::Duration::zero() {
                return Err(ConfigError::NotificationTtl(ttl.num_minutes()));
            }
        }
        Ok(())
    }

    /// Google Directions when a key is configured, the offline heuristic otherwise.
    pub fn mapping_provider(&self) -> Result<Arc<dyn MappingProvider>, ConfigError> {
        match self.google_maps_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                info!(timeout = ?self.provider_timeout, "using Google Directions for route optimization");
                Ok(Arc::new(GoogleDirectionsClient::new(key, self.provider_timeout)?))
            }
            None => {
                info!("no maps api key configured, using offline heuristic ordering");
                Ok(Arc::new(HeuristicProvider::default()))
            }
        }
    }
}
