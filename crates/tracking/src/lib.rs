//! # fleet-tracking
//!
//! Geospatial core of fleet dispatch: stop ordering and proximity alerts.
//!
//! ## Features
//!
//! - **Geo math**: haversine distance and bearings on a spherical Earth
//! - **Proximity**: distance checks against pending stops with an inclusive threshold
//! - **Throttle**: at-most-once notification per (trip, stop) approach
//! - **Optimization cache**: one live plan per route with a freshness window
//! - **Pluggable mapping**: implement [`MappingProvider`] for any routing service
//!
//! ## Example
//!
//! ```
//! use fleet_tracking::prelude::*;
//! use chrono::Utc;
//!
//! let stops = vec![
//!     Stop::new("A", "route_1", 0, 0.0, 0.0).unwrap(),
//!     Stop::new("B", "route_1", 1, 0.0, 0.01).unwrap(),
//!     Stop::new("C", "route_1", 2, 0.0, 0.02).unwrap(),
//! ];
//!
//! let position = VehiclePosition::new("trip_1", "bus_7", "route_1", 0.0, 0.0099, Utc::now()).unwrap();
//! let checks = check_proximity(&position, &stops, 200.0).unwrap();
//!
//! let nearby: Vec<_> = checks.iter().filter(|c| c.is_within_threshold).collect();
//! assert_eq!(nearby.len(), 1);
//! assert_eq!(find_nearest(&position, &stops).unwrap().stop_id.as_str(), "B");
//! ```

pub mod cache;
pub mod identifiers;
pub mod models;
pub mod network;
pub mod provider;
pub mod proximity;
pub mod spatial;
pub mod throttle;

pub use geo::Point;

// Re-exports for convenience
pub mod prelude {
    pub use crate::cache::OptimizationCache;
    pub use crate::identifiers::*;
    pub use crate::models::{traits::*, types::*};
    pub use crate::network::traits::*;
    pub use crate::provider::{HeuristicProvider, MemoryTrackingStore};
    pub use crate::proximity::{
        check_proximity, find_nearest, pending_stops, DEFAULT_THRESHOLD_METERS,
    };
    pub use crate::spatial::{haversine_distance, initial_bearing, validate_coordinates};
    pub use crate::throttle::{decide, pairs_for_trip, NotifiedPairs};
    pub use geo::Point;
}

pub use prelude::*;
