//! Per-client token buckets in front of the request handlers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Burst size
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    /// A bucket of `n` requests refilled over one minute. `0` disables limiting.
    pub fn per_minute(n: u32) -> Option<Self> {
        (n > 0).then(|| Self {
            capacity: f64::from(n),
            refill_per_sec: f64::from(n) / 60.0,
        })
    }
}

/// Limits for each rate-limited endpoint; `None` leaves it open
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RateLimits {
    pub optimize: Option<RateLimitConfig>,
    pub proximity: Option<RateLimitConfig>,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let cfg = &self.config;
        let mut lock = self.buckets.lock().await;
        let bucket = lock.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: cfg.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * cfg.refill_per_sec).min(cfg.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// First `x-forwarded-for` hop when it looks like an address, else the peer IP.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| {
            !v.is_empty()
                && v.len() <= 64
                && v.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-'))
        });

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_owned(),
    }
}

pub async fn limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(req.headers(), peer);

    if !limiter.allow(&key).await {
        debug!(client = %key, path = %req.uri().path(), "rate limited");
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}
