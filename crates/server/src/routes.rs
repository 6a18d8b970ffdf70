use std::sync::Arc;

use api_types::{
    CheckProximityRequest, CheckProximityResponse, NearestStopPayload, OptimizeRouteRequest,
    OptimizeRouteResponse, PlannedStopPayload, ProximityCheckPayload, StopPayload,
};
use axum::extract::{Query, State};
use axum::middleware;
use axum::routing::{MethodRouter, get, post};
use axum::{Json, Router};
use chrono::Utc;
use fleet_core::TrackingServices;
use fleet_core::optimizer::OptimizationOutcome;
use fleet_core::proximity::ProximityReport;
use fleet_core::tracking::prelude::*;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::error::ApiError;
use crate::rate_limit::{self, RateLimitConfig, RateLimiter, RateLimits};

type Services = Arc<TrackingServices>;

pub fn create_router(services: TrackingServices, limits: RateLimits) -> Router {
    let services = Arc::new(services);

    Router::new()
        .route(
            "/api/optimize-route",
            limited(post(optimize_route), limits.optimize),
        )
        .route(
            "/api/check-proximity",
            limited(
                post(check_proximity_body).get(check_proximity_query),
                limits.proximity,
            ),
        )
        .route("/health", get(health))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(services)
}

fn limited(
    route: MethodRouter<Services>,
    config: Option<RateLimitConfig>,
) -> MethodRouter<Services> {
    match config {
        Some(config) => route.layer(middleware::from_fn_with_state(
            Arc::new(RateLimiter::new(config)),
            rate_limit::limit,
        )),
        None => route,
    }
}

// ============================================================================
// Route optimization
// ============================================================================

async fn optimize_route(
    State(services): State<Services>,
    Json(req): Json<OptimizeRouteRequest>,
) -> Result<Json<OptimizeRouteResponse>, ApiError> {
    let route_id = RouteIdentifier::new(req.route_id.trim());
    if route_id.is_blank() {
        return Err(TrackingError::InvalidInput("routeId is required".into()).into());
    }

    let explicit = req
        .stops
        .map(|stops| explicit_stops(&route_id, stops))
        .transpose()?;

    match services.optimizer.optimize(&route_id, explicit).await {
        Ok(outcome) => Ok(Json(optimize_response(outcome))),
        Err(TrackingError::InsufficientStops { found, .. }) => {
            debug!(%route_id, found, "not enough stops to optimize");
            Ok(Json(OptimizeRouteResponse {
                optimized: false,
                message: Some(format!(
                    "route needs at least two stops to optimize, found {found}"
                )),
                ..Default::default()
            }))
        }
        Err(e) => Err(e.into()),
    }
}

/// Stops sent with the request take their position as sequence. The address
/// is kept as a display name only.
fn explicit_stops(route_id: &RouteIdentifier, payload: Vec<StopPayload>) -> Result<Vec<Stop>> {
    payload
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let (Some(latitude), Some(longitude)) = (p.latitude, p.longitude) else {
                return Err(TrackingError::InvalidInput(format!(
                    "stop {i} needs latitude and longitude"
                )));
            };
            let id = p
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("stop_{i}"));

            let stop = Stop::new(id, route_id.clone(), i as u32, latitude, longitude)?;
            Ok(match p.address {
                Some(address) => stop.with_name(address),
                None => stop,
            })
        })
        .collect()
}

fn optimize_response(outcome: OptimizationOutcome) -> OptimizeRouteResponse {
    let plan = outcome.plan;
    let message = (!outcome.optimized)
        .then(|| "route optimization unavailable, stops are in their original order".to_owned());

    OptimizeRouteResponse {
        optimized: outcome.optimized,
        stops: plan
            .stops
            .into_iter()
            .map(|s| PlannedStopPayload {
                stop_id: s.stop_id.to_string(),
                sequence: s.sequence,
                latitude: s.latitude,
                longitude: s.longitude,
            })
            .collect(),
        etas: plan
            .etas
            .into_iter()
            .map(|(id, seconds)| (id.to_string(), seconds))
            .collect(),
        cached: outcome.cached,
        total_duration_seconds: plan.total_duration_seconds,
        total_distance_meters: plan.total_distance_meters,
        used_live_traffic: plan.used_live_traffic,
        polyline: plan.polyline,
        message,
    }
}

// ============================================================================
// Proximity
// ============================================================================

async fn check_proximity_body(
    State(services): State<Services>,
    Json(req): Json<CheckProximityRequest>,
) -> Result<Json<CheckProximityResponse>, ApiError> {
    check_proximity(services, req).await
}

async fn check_proximity_query(
    State(services): State<Services>,
    Query(req): Query<CheckProximityRequest>,
) -> Result<Json<CheckProximityResponse>, ApiError> {
    check_proximity(services, req).await
}

async fn check_proximity(
    services: Services,
    req: CheckProximityRequest,
) -> Result<Json<CheckProximityResponse>, ApiError> {
    let position = VehiclePosition::new(
        req.trip_id.trim(),
        req.vehicle_id.trim(),
        req.route_id.trim(),
        req.bus_lat,
        req.bus_lng,
        Utc::now(),
    )?;

    let threshold = req.threshold_meters;
    let report = tokio::task::spawn_blocking(move || services.proximity.check(&position, threshold))
        .await
        .map_err(|e| TrackingError::Storage(format!("proximity task failed: {e}")))??;
    Ok(Json(proximity_response(report)))
}

fn proximity_response(report: ProximityReport) -> CheckProximityResponse {
    CheckProximityResponse {
        nearby: report.nearby,
        nearest_stop: report.nearest_stop.map(|n| NearestStopPayload {
            stop_id: n.stop_id.to_string(),
            distance_meters: n.distance_m,
        }),
        checks: report
            .checks
            .into_iter()
            .map(|c| ProximityCheckPayload {
                stop_id: c.stop_id.to_string(),
                stop_name: c.stop_name.map(|n| n.to_string()),
                stop_seq: c.stop_sequence,
                distance_meters: c.distance_m,
                is_within_threshold: c.is_within_threshold,
            })
            .collect(),
        should_notify: report.should_notify,
        notify_reason: report.notify_reason.map(|r| r.to_string()),
        message: report.message,
    }
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use fleet_core::config::TrackingConfig;
    use fleet_core::optimizer::RouteOptimizer;
    use fleet_core::proximity::ProximityService;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct DownProvider;

    impl MappingProvider for DownProvider {
        fn optimize_waypoints<'a>(
            &'a self,
            _origin: Point,
            _destination: Point,
            _interior: &'a [Point],
        ) -> Pin<Box<dyn Future<Output = Result<WaypointOrder>> + Send + 'a>> {
            Box::pin(async { Err(TrackingError::ProviderUnavailable("quota exceeded".into())) })
        }
    }

    fn store() -> Arc<MemoryTrackingStore> {
        Arc::new(MemoryTrackingStore::from_stops(vec![
            Stop::new("A", "r1", 0, 0.0, 0.0).unwrap().with_name("Depot"),
            Stop::new("B", "r1", 1, 0.0, 0.01).unwrap().with_name("Market"),
            Stop::new("C", "r1", 2, 0.0, 0.02).unwrap().with_name("School"),
            Stop::new("D", "r1", 3, 0.0, 0.03).unwrap().with_name("Terminal"),
        ]))
    }

    fn app() -> Router {
        create_router(
            TrackingServices::new(&TrackingConfig::default(), store()).unwrap(),
            RateLimits::default(),
        )
    }

    fn app_with_provider_down() -> Router {
        let store = store();
        let services = TrackingServices {
            optimizer: RouteOptimizer::new(
                store.clone(),
                Arc::new(DownProvider),
                OptimizationCache::with_default_window(store.clone()),
            ),
            proximity: ProximityService::new(store.clone(), store.clone(), store),
        };
        create_router(services, RateLimits::default())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn stop_ids(body: &Value) -> Vec<&str> {
        body["stops"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["stopId"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_optimize_stored_route() {
        let app = app();

        let (status, body) =
            send(app.clone(), post_json("/api/optimize-route", json!({ "routeId": "r1" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["optimized"], true);
        assert_eq!(body["cached"], false);
        assert_eq!(body["etas"]["A"], 0);
        let ids = stop_ids(&body);
        assert_eq!(ids.first(), Some(&"A"));
        assert_eq!(ids.last(), Some(&"D"));

        let (_, again) =
            send(app, post_json("/api/optimize-route", json!({ "routeId": "r1" }))).await;
        assert_eq!(again["cached"], true);
        assert_eq!(again["stops"], body["stops"]);
    }

    #[tokio::test]
    async fn test_optimize_explicit_stops() {
        let (status, body) = send(
            app(),
            post_json(
                "/api/optimize-route",
                json!({
                    "routeId": "adhoc",
                    "stops": [
                        { "address": "Depot", "latitude": 0.0, "longitude": 0.0 },
                        { "id": "far", "latitude": 0.0, "longitude": 0.03 },
                        { "id": "near", "latitude": 0.0, "longitude": 0.01 },
                        { "id": "end", "latitude": 0.0, "longitude": 0.04 }
                    ]
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(stop_ids(&body), vec!["stop_0", "near", "far", "end"]);
    }

    #[tokio::test]
    async fn test_optimize_degraded_response() {
        let (status, body) = send(
            app_with_provider_down(),
            post_json("/api/optimize-route", json!({ "routeId": "r1" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["optimized"], false);
        assert_eq!(stop_ids(&body), vec!["A", "B", "C", "D"]);
        assert_eq!(body["etas"], json!({}));
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_optimize_route_without_stops() {
        let (status, body) =
            send(app(), post_json("/api/optimize-route", json!({ "routeId": "empty" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["optimized"], false);
        assert_eq!(body["stops"], json!([]));
        assert!(body["message"].as_str().unwrap().contains("at least two stops"));
    }

    #[tokio::test]
    async fn test_optimize_rejects_bad_input() {
        let (status, body) =
            send(app(), post_json("/api/optimize-route", json!({ "routeId": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(
            app(),
            post_json(
                "/api/optimize-route",
                json!({ "routeId": "r1", "stops": [{ "id": "x", "latitude": 1.0 }] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_optimize_rejects_duplicate_stop_ids() {
        let (status, body) = send(
            app(),
            post_json(
                "/api/optimize-route",
                json!({
                    "routeId": "adhoc",
                    "stops": [
                        { "latitude": 0.0, "longitude": 0.0 },
                        { "id": "stop_0", "latitude": 0.0, "longitude": 0.01 },
                        { "id": "end", "latitude": 0.0, "longitude": 0.02 }
                    ]
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("stop_0"));
    }

    #[tokio::test]
    async fn test_optimize_rate_limited_per_client() {
        let limits = RateLimits {
            optimize: RateLimitConfig::per_minute(2),
            proximity: None,
        };
        let app = create_router(
            TrackingServices::new(&TrackingConfig::default(), store()).unwrap(),
            limits,
        );
        let from = |client: &'static str| {
            let mut req = post_json("/api/optimize-route", json!({ "routeId": "r1" }));
            req.headers_mut()
                .insert("x-forwarded-for", header::HeaderValue::from_static(client));
            req
        };

        for _ in 0..2 {
            let (status, _) = send(app.clone(), from("203.0.113.9")).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(app.clone(), from("203.0.113.9")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "rate limit exceeded");

        let (status, _) = send(app.clone(), from("198.51.100.4")).await;
        assert_eq!(status, StatusCode::OK);

        let health = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(health).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_check_proximity_notifies_once() {
        let app = app();
        let body = json!({
            "tripId": "t1", "routeId": "r1", "vehicleId": "bus_7",
            "busLat": 0.0, "busLng": 0.0099, "thresholdMeters": 200
        });

        let (status, first) =
            send(app.clone(), post_json("/api/check-proximity", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["nearby"], true);
        assert_eq!(first["shouldNotify"], true);
        assert_eq!(first["notifyReason"], "approaching_stop");
        assert_eq!(first["nearestStop"]["stopId"], "B");

        let market = first["checks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["stopId"] == "B")
            .unwrap();
        assert_eq!(market["stopName"], "Market");
        assert_eq!(market["stopSeq"], 1);
        assert_eq!(market["isWithinThreshold"], true);

        let (_, second) = send(app, post_json("/api/check-proximity", body)).await;
        assert_eq!(second["shouldNotify"], false);
        assert_eq!(second["notifyReason"], "already_notified");
    }

    #[tokio::test]
    async fn test_check_proximity_by_query() {
        let uri = "/api/check-proximity?tripId=t1&routeId=r1&vehicleId=bus_7&busLat=0.0&busLng=0.5";
        let (status, body) = send(
            app(),
            Request::get(uri).body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nearby"], false);
        assert_eq!(body["shouldNotify"], false);
        assert_eq!(body["notifyReason"], Value::Null);
        assert_eq!(body["nearestStop"]["stopId"], "D");
    }

    #[tokio::test]
    async fn test_check_proximity_rejects_bad_position() {
        let (status, body) = send(
            app(),
            post_json(
                "/api/check-proximity",
                json!({
                    "tripId": "t1", "routeId": "r1", "vehicleId": "bus_7",
                    "busLat": 91.0, "busLng": 0.0
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("latitude"));
    }
}
