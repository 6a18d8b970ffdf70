//! Mapping provider implementations backed by external routing services.

pub mod google;

pub use google::GoogleDirectionsClient;
