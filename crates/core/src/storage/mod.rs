//! Durable stores for stops, cached plans, arrivals and notifications.

pub mod sqlite;

pub use sqlite::SqliteTrackingStore;
