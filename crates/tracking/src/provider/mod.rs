//! Built-in providers: offline waypoint ordering and in-memory storage.

pub mod heuristic;
pub mod memory;

pub use heuristic::{nearest_neighbor_two_opt, HeuristicProvider};
pub use memory::MemoryTrackingStore;
