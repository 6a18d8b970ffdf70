//! HTTP front end for the fleet tracking services.

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;

pub use rate_limit::{RateLimitConfig, RateLimits};
pub use routes::create_router;
