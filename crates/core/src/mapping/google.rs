//! Google Directions API client.
//!
//! Asks the Directions endpoint to reorder interior waypoints
//! (`optimize:true`) and reads back the waypoint order and per-leg durations,
//! preferring traffic-aware durations when the API returns them.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use fleet_tracking::network::{MappingProvider, WaypointOrder};
use fleet_tracking::provider::nearest_neighbor_two_opt;
use fleet_tracking::{Point, Result, TrackingError};
use itertools::Itertools;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    waypoint_order: Vec<usize>,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
    #[serde(default)]
    overview_polyline: Option<EncodedPolyline>,
}

#[derive(Debug, Deserialize)]
struct EncodedPolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    duration: Option<ValueField>,
    duration_in_traffic: Option<ValueField>,
    distance: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}

#[derive(Clone)]
pub struct GoogleDirectionsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl GoogleDirectionsClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://maps.googleapis.com/maps/api/";

    /// Largest waypoint count the Directions API will optimize in one request
    pub const MAX_OPTIMIZED_WAYPOINTS: usize = 25;

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackingError::ProviderUnavailable(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: Url::parse(Self::DEFAULT_BASE_URL)
                .map_err(|e| TrackingError::InvalidInput(e.to_string()))?,
        })
    }

    /// Point the client at another deployment of the same API
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Url::parse(base_url)
            .map_err(|e| TrackingError::InvalidInput(format!("base url {base_url}: {e}")))?;
        Ok(self)
    }

    fn request_url(
        &self,
        origin: Point,
        destination: Point,
        interior: &[Point],
        optimize: bool,
    ) -> Result<Url> {
        let endpoint = self
            .base_url
            .join("directions/json")
            .map_err(|e| TrackingError::InvalidInput(e.to_string()))?;

        let waypoints = interior.iter().map(|p| format_latlng(*p)).join("|");
        let waypoints = if optimize {
            format!("optimize:true|{waypoints}")
        } else {
            waypoints
        };

        Url::parse_with_params(
            endpoint.as_str(),
            &[
                ("origin", format_latlng(origin)),
                ("destination", format_latlng(destination)),
                ("waypoints", waypoints),
                ("departure_time", "now".to_string()),
                ("traffic_model", "best_guess".to_string()),
                ("key", self.api_key.clone()),
            ],
        )
        .map_err(|e| TrackingError::InvalidInput(e.to_string()))
    }

    async fn fetch(&self, url: Url) -> Result<DirectionsResponse> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TrackingError::ProviderUnavailable("directions request timed out".into())
            } else {
                TrackingError::ProviderUnavailable(format!("directions request failed: {}", e.without_url()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackingError::ProviderUnavailable(format!(
                "directions returned HTTP {status}"
            )));
        }

        response
            .json::<DirectionsResponse>()
            .await
            .map_err(|e| TrackingError::ProviderUnavailable(format!("malformed directions body: {}", e.without_url())))
    }
}

impl MappingProvider for GoogleDirectionsClient {
    fn optimize_waypoints<'a>(
        &'a self,
        origin: Point,
        destination: Point,
        interior: &'a [Point],
    ) -> Pin<Box<dyn Future<Output = Result<WaypointOrder>> + Send + 'a>> {
        Box::pin(async move {
            if interior.is_empty() {
                return Ok(WaypointOrder::identity(0));
            }

            // Past the API limit: order locally, ask only for leg timings
            let fixed_order = (interior.len() > Self::MAX_OPTIMIZED_WAYPOINTS)
                .then(|| nearest_neighbor_two_opt(origin, destination, interior));

            let url = match &fixed_order {
                Some(order) => {
                    let ordered: Vec<Point> = order.iter().map(|&i| interior[i]).collect();
                    self.request_url(origin, destination, &ordered, false)?
                }
                None => self.request_url(origin, destination, interior, true)?,
            };

            info!(
                waypoints = interior.len(),
                optimize_remotely = fixed_order.is_none(),
                "requesting directions"
            );
            let response = self.fetch(url).await?;
            let order = interpret_response(response, interior.len(), fixed_order);
            if let Err(ref e) = order {
                warn!(error = %e, "directions response rejected");
            }
            order
        })
    }
}

fn format_latlng(point: Point) -> String {
    format!("{},{}", point.y(), point.x())
}

fn interpret_response(
    response: DirectionsResponse,
    interior_len: usize,
    fixed_order: Option<Vec<usize>>,
) -> Result<WaypointOrder> {
    if response.status != "OK" {
        return Err(TrackingError::ProviderUnavailable(match response.error_message {
            Some(message) => format!("directions status {}: {message}", response.status),
            None => format!("directions status {}", response.status),
        }));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| TrackingError::ProviderUnavailable("directions returned no routes".into()))?;

    let leg_durations_seconds = route
        .legs
        .iter()
        .map(|leg| {
            leg.duration_in_traffic
                .as_ref()
                .or(leg.duration.as_ref())
                .map(|d| d.value.max(0.0).round() as u32)
                .ok_or_else(|| TrackingError::ProviderUnavailable("leg without duration".into()))
        })
        .collect::<Result<Vec<u32>>>()?;

    let total_distance_meters = route
        .legs
        .iter()
        .map(|leg| leg.distance.as_ref().map(|d| d.value))
        .sum::<Option<f64>>();

    let used_live_traffic = route.legs.iter().any(|leg| leg.duration_in_traffic.is_some());

    let ordered_indices = match fixed_order {
        Some(order) => order,
        None => route.waypoint_order,
    };

    let order = WaypointOrder {
        ordered_indices,
        leg_durations_seconds,
        total_distance_meters,
        used_live_traffic,
        polyline: route
            .overview_polyline
            .map(|p| p.points)
            .filter(|p| !p.is_empty()),
    };

    if !order.is_consistent_with(interior_len) {
        return Err(TrackingError::ProviderUnavailable(format!(
            "directions answer does not cover {interior_len} waypoints"
        )));
    }

    debug!(order = ?order.ordered_indices, "directions answer accepted");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleDirectionsClient {
        GoogleDirectionsClient::new("test-key", Duration::from_secs(5)).unwrap()
    }

    fn parse(body: &str) -> DirectionsResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_request_url_marks_optimization() {
        let url = client()
            .request_url(
                Point::new(-47.88, -15.79),
                Point::new(-47.90, -15.80),
                &[Point::new(-47.89, -15.795)],
                true,
            )
            .unwrap();

        assert_eq!(url.path(), "/maps/api/directions/json");
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("origin".into(), "-15.79,-47.88".into())));
        assert!(params.contains(&("waypoints".into(), "optimize:true|-15.795,-47.89".into())));
        assert!(params.contains(&("key".into(), "test-key".into())));
    }

    #[test]
    fn test_interpret_prefers_traffic_durations() {
        let body = parse(
            r#"{
                "status": "OK",
                "routes": [{
                    "waypoint_order": [1, 0],
                    "legs": [
                        {"duration": {"value": 100, "text": "2 mins"}, "duration_in_traffic": {"value": 130}, "distance": {"value": 900}},
                        {"duration": {"value": 200}, "distance": {"value": 1500}},
                        {"duration": {"value": 50}, "distance": {"value": 400}}
                    ],
                    "overview_polyline": {"points": "_p~iF~ps|U_ulLnnqC"}
                }]
            }"#,
        );

        let order = interpret_response(body, 2, None).unwrap();
        assert_eq!(order.ordered_indices, vec![1, 0]);
        assert_eq!(order.leg_durations_seconds, vec![130, 200, 50]);
        assert_eq!(order.total_distance_meters, Some(2800.0));
        assert!(order.used_live_traffic);
        assert_eq!(order.polyline.as_deref(), Some("_p~iF~ps|U_ulLnnqC"));
    }

    #[test]
    fn test_interpret_rejects_bad_status() {
        let body = parse(r#"{"status": "OVER_QUERY_LIMIT", "error_message": "quota"}"#);
        let err = interpret_response(body, 1, None).unwrap_err();
        assert!(matches!(err, TrackingError::ProviderUnavailable(ref m) if m.contains("OVER_QUERY_LIMIT")));
    }

    #[test]
    fn test_interpret_rejects_incomplete_order() {
        let body = parse(
            r#"{"status": "OK", "routes": [{"waypoint_order": [0], "legs": [{"duration": {"value": 1}}, {"duration": {"value": 1}}]}]}"#,
        );
        assert!(interpret_response(body, 2, None).is_err());

        let no_routes = parse(r#"{"status": "OK", "routes": []}"#);
        assert!(interpret_response(no_routes, 1, None).is_err());
    }

    #[test]
    fn test_interpret_keeps_local_order_for_large_routes() {
        let legs = (0..=27).map(|_| r#"{"duration": {"value": 60}}"#).join(",");
        let body = parse(&format!(
            r#"{{"status": "OK", "routes": [{{"waypoint_order": [], "legs": [{legs}]}}]}}"#
        ));
        let local: Vec<usize> = (0..27).rev().collect();

        let order = interpret_response(body, 27, Some(local.clone())).unwrap();
        assert_eq!(order.ordered_indices, local);
        assert_eq!(order.leg_durations_seconds.len(), 28);
        assert_eq!(order.total_distance_meters, None);
        assert!(!order.used_live_traffic);
        assert_eq!(order.polyline, None);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_unavailable() {
        let client = client().with_base_url("http://127.0.0.1:9/maps/api/").unwrap();
        let interior = [Point::new(0.0, 0.01)];

        let err = client
            .optimize_waypoints(Point::new(0.0, 0.0), Point::new(0.0, 0.02), &interior)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_no_interior_skips_the_network() {
        let client = client().with_base_url("http://127.0.0.1:9/maps/api/").unwrap();
        let order = client
            .optimize_waypoints(Point::new(0.0, 0.0), Point::new(0.0, 0.02), &[])
            .await
            .unwrap();
        assert!(order.ordered_indices.is_empty());
    }
}
