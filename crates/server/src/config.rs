use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fleet_core::config::{ConfigError, TrackingConfig};

use crate::rate_limit::{RateLimitConfig, RateLimits};

#[derive(Parser, Debug)]
#[command(
    name = "fleet-server",
    author,
    version,
    about = "Route optimization and stop proximity alerts for fleet dispatch"
)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "FLEET_BIND", default_value = "0.0.0.0:3030")]
    pub bind: SocketAddr,

    /// SQLite database holding stops, cached plans and trip state
    #[arg(long, env = "FLEET_DATABASE", default_value = "fleet-tracking.sqlite")]
    pub database: PathBuf,

    /// Google Maps API key. Without one, stops are ordered offline.
    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    pub google_maps_api_key: Option<String>,

    /// Timeout for one mapping provider request
    #[arg(long, env = "FLEET_PROVIDER_TIMEOUT_SECS", default_value_t = 8)]
    pub provider_timeout_secs: u64,

    /// How long an optimized plan is served from cache
    #[arg(long, env = "FLEET_CACHE_FRESHNESS_MINUTES", default_value_t = 10)]
    pub cache_freshness_minutes: i64,

    /// Proximity threshold when a request does not give one
    #[arg(long, env = "FLEET_DEFAULT_THRESHOLD_METERS", default_value_t = 500.0)]
    pub default_threshold_meters: f64,

    /// Let notifications for a (trip, stop) fire again after this long
    #[arg(long, env = "FLEET_NOTIFICATION_TTL_MINUTES")]
    pub notification_ttl_minutes: Option<i64>,

    /// Route optimizations one client may request per minute (0 disables)
    #[arg(long, env = "FLEET_OPTIMIZE_RATE_LIMIT_PER_MINUTE", default_value_t = 10)]
    pub optimize_rate_limit_per_minute: u32,

    /// Proximity checks one client may send per minute (0 disables)
    #[arg(long, env = "FLEET_PROXIMITY_RATE_LIMIT_PER_MINUTE", default_value_t = 120)]
    pub proximity_rate_limit_per_minute: u32,
}

impl Args {
    pub fn tracking_config(&self) -> Result<TrackingConfig, ConfigError> {
        let cache_freshness = chrono::Duration::try_minutes(self.cache_freshness_minutes)
            .ok_or(ConfigError::FreshnessWindow(self.cache_freshness_minutes))?;
        let notification_ttl = self
            .notification_ttl_minutes
            .map(|m| chrono::Duration::try_minutes(m).ok_or(ConfigError::NotificationTtl(m)))
            .transpose()?;

        Ok(TrackingConfig {
            google_maps_api_key: self.google_maps_api_key.clone(),
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            cache_freshness,
            default_threshold_m: self.default_threshold_meters,
            notification_ttl,
        })
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            optimize: RateLimitConfig::per_minute(self.optimize_rate_limit_per_minute),
            proximity: RateLimitConfig::per_minute(self.proximity_rate_limit_per_minute),
        }
    }
}
