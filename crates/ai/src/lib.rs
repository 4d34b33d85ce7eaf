//! `stockwatch-ai`
//!
//! **Responsibility:** stockout prediction for inventory items.
//!
//! - Loads the stockout model artifact once and fails open to a formula when
//!   it is missing or broken.
//! - Caches predictions by item content so repeated requests are cheap.
//! - Never mutates inventory; it only reads snapshots and emits
//!   [`PredictionResult`](stockwatch_inventory::PredictionResult)s.

pub mod features;
pub mod model;
pub mod predictor;
pub mod result;
pub mod settings;
pub mod usage;

pub use features::{Feature, FeatureVector};
pub use model::{LinearModel, LinearModelArtifact, ModelHandle, ModelLoader, StockoutModel};
pub use predictor::{
    BatchReport, StockoutPredictor, days_until_reorder, fallback_days_until_stockout, recommended_order_quantity,
};
pub use result::{EngineError, PredictionError};
pub use settings::{ConfigError, EngineConfig};
pub use usage::{UsageBasis, UsageEstimate, UsagePolicy};
