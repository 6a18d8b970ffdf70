//! Mapping provider abstraction.

pub mod traits;

pub use traits::{MappingProvider, WaypointOrder};
