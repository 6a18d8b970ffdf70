//! Tracking data models, types, and traits.

pub mod traits;
pub mod types;

// Re-exports for convenience
pub use traits::{NotificationLedger, PlanStore, StopSource, VisitedStopLog};
pub use types::{
    NearestStop, NotificationDecision, NotifyReason, OptimizedRoutePlan, PlannedStop,
    ProximityCheck, Result, Stop, TrackingError, VehiclePosition, VisitedStopEvent,
};
