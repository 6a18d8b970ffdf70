//! JSON wire types of the fleet tracking HTTP API.
//!
//! All bodies are camelCase. These types carry no validation; the server
//! turns them into checked domain values before use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Route optimization
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRouteRequest {
    pub route_id: String,
    /// Stops to order instead of the route's stored ones
    #[serde(default)]
    pub stops: Option<Vec<StopPayload>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StopPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStopPayload {
    pub stop_id: String,
    pub sequence: u32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRouteResponse {
    pub optimized: bool,
    pub stops: Vec<PlannedStopPayload>,
    /// Seconds from trip start, keyed by stop id
    pub etas: BTreeMap<String, u32>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance_meters: Option<f64>,
    /// Whether ETAs reflect current traffic
    #[serde(default)]
    pub used_live_traffic: bool,
    /// Encoded overview polyline of the optimized route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Proximity
// ============================================================================

/// Body of `POST /api/check-proximity`, and the query of its `GET` twin
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckProximityRequest {
    pub trip_id: String,
    pub route_id: String,
    pub vehicle_id: String,
    pub bus_lat: f64,
    pub bus_lng: f64,
    #[serde(default)]
    pub threshold_meters: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NearestStopPayload {
    pub stop_id: String,
    pub distance_meters: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProximityCheckPayload {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub stop_seq: u32,
    pub distance_meters: f64,
    pub is_within_threshold: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckProximityResponse {
    pub nearby: bool,
    pub nearest_stop: Option<NearestStopPayload>,
    pub checks: Vec<ProximityCheckPayload>,
    pub should_notify: bool,
    /// `approaching_stop` or `already_notified`
    pub notify_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
