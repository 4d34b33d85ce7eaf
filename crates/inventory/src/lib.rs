//! Inventory data model.
//!
//! Plain records exchanged with the ingestion side (`InventoryItem`) and with
//! callers of the predictor (`PredictionResult`). Deterministic, no IO.

pub mod item;
pub mod prediction;

pub use item::InventoryItem;
pub use prediction::{PredictionResult, PredictionSource, Urgency};
