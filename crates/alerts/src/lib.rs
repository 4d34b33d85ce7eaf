//! Alert aggregation.
//!
//! Turns stockout timing into urgency tiers and rolls batches of predictions up
//! into summaries for alerting. Everything here is a pure function of its
//! inputs; nothing reads the cache or the model.

pub mod status;
pub mod summary;
pub mod thresholds;

pub use status::InventoryStatus;
pub use summary::{AlertRef, FacilityAlerts, Summary, filter_by_urgency, sort_by_priority, summarize};
pub use thresholds::AlertThresholds;
