use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use stockwatch_alerts::{AlertThresholds, FacilityAlerts, Summary, summarize};
use stockwatch_cache::{CacheStats, TtlCache};
use stockwatch_core::{FacilityId, Fingerprint, ItemId, SharedClock};
use stockwatch_inventory::{InventoryItem, PredictionResult, PredictionSource};

use crate::features::FeatureVector;
use crate::model::{ModelHandle, ModelLoader};
use crate::result::{EngineError, PredictionError};
use crate::settings::EngineConfig;
use crate::usage::{UsageEstimate, UsagePolicy};

/// Predictions for a batch plus their roll-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One per input item, in input order.
    pub predictions: Vec<PredictionResult>,
    pub summary: Summary,
    pub generated_at: DateTime<Utc>,
}

/// Fields that determine a prediction; their fingerprint is the cache key.
#[derive(Serialize)]
struct PredictionKey<'a> {
    item_id: &'a ItemId,
    facility_id: &'a FacilityId,
    current_stock: i64,
    reorder_level: i64,
    last_restock_date: Option<NaiveDate>,
    category: Option<&'a str>,
    daily_usage_rate: Option<f64>,
}

/// Days until stockout by the fallback formula.
///
/// `None` means no depletion signal (usage is zero and stock remains).
pub fn fallback_days_until_stockout(current_stock: i64, daily_usage_rate: f64) -> Option<f64> {
    if current_stock == 0 {
        Some(0.0)
    } else if daily_usage_rate <= 0.0 {
        None
    } else {
        Some(current_stock as f64 / daily_usage_rate)
    }
}

/// Units to order so stock covers `target_buffer_days` of usage.
pub fn recommended_order_quantity(current_stock: i64, daily_usage_rate: f64, target_buffer_days: f64) -> u64 {
    if daily_usage_rate <= 0.0 {
        return 0;
    }
    let shortfall = (target_buffer_days * daily_usage_rate - current_stock as f64).ceil();
    if shortfall > 0.0 { shortfall as u64 } else { 0 }
}

/// Days until stock falls to the reorder level at `daily_usage_rate`.
///
/// 0 when already at or below it; `None` with no depletion signal.
pub fn days_until_reorder(current_stock: i64, reorder_level: i64, daily_usage_rate: f64) -> Option<f64> {
    if current_stock <= reorder_level {
        Some(0.0)
    } else if daily_usage_rate <= 0.0 {
        None
    } else {
        Some((current_stock - reorder_level) as f64 / daily_usage_rate)
    }
}

/// Stockout prediction service.
///
/// Shared, thread-safe state is limited to the model loader and the cache;
/// each request is otherwise independent. Results are served from the cache
/// while fresh and recomputed (model first, formula as fallback) otherwise.
#[derive(Debug)]
pub struct StockoutPredictor {
    config: EngineConfig,
    thresholds: AlertThresholds,
    usage: UsagePolicy,
    model: Arc<ModelLoader>,
    cache: Arc<TtlCache<JsonValue>>,
    clock: SharedClock,
}

impl StockoutPredictor {
    /// Build a predictor with its own loader (for `config.model_path`) and cache.
    pub fn new(config: EngineConfig, clock: SharedClock) -> Result<Self, EngineError> {
        let model = Arc::new(ModelLoader::new(config.model_path.clone(), clock.clone()));
        let cache = Arc::new(TtlCache::new(
            config.cache_max_size,
            config.cache_ttl_seconds,
            clock.clone(),
        )?);
        Self::with_parts(config, model, cache, clock)
    }

    /// Build around an existing loader and cache (shared between predictors).
    pub fn with_parts(
        config: EngineConfig,
        model: Arc<ModelLoader>,
        cache: Arc<TtlCache<JsonValue>>,
        clock: SharedClock,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if config.eager_model_load {
            model.ensure_loaded();
        }
        Ok(Self {
            thresholds: config.thresholds(),
            usage: UsagePolicy::from_config(&config),
            config,
            model,
            cache,
            clock,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_handle(&self) -> ModelHandle {
        self.model.handle()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cache key for `item`.
    pub fn cache_key(item: &InventoryItem) -> Result<Fingerprint, PredictionError> {
        let key = PredictionKey {
            item_id: &item.item_id,
            facility_id: &item.facility_id,
            current_stock: item.current_stock,
            reorder_level: item.reorder_level,
            last_restock_date: item.last_restock_date,
            category: item.category.as_deref(),
            daily_usage_rate: item.daily_usage_rate,
        };
        Ok(Fingerprint::of(&key)?)
    }

    /// Drop the cached prediction for `item`, if any.
    pub fn invalidate(&self, item: &InventoryItem) -> bool {
        match Self::cache_key(item) {
            Ok(key) => self.cache.invalidate(key.as_str()),
            Err(_) => false,
        }
    }

    /// Predict one item.
    ///
    /// Only invalid item data is reported as an error; model problems degrade
    /// to the fallback formula inside the call.
    pub fn predict(&self, item: &InventoryItem) -> Result<PredictionResult, PredictionError> {
        item.validate()?;
        let key = Self::cache_key(item)?;

        if let Some(cached) = self.cached(key.as_str(), item) {
            debug!(item_id = %item.item_id, facility_id = %item.facility_id, key = key.short(), "prediction served from cache");
            return Ok(cached);
        }

        let result = self.compute(item);

        match serde_json::to_value(&result) {
            Ok(value) => self
                .cache
                .set(key.into_string(), value, self.config.cache_ttl_seconds),
            Err(err) => warn!(item_id = %item.item_id, error = %err, "failed to encode prediction for cache"),
        }

        Ok(result)
    }

    fn cached(&self, key: &str, item: &InventoryItem) -> Option<PredictionResult> {
        let value = self.cache.get(key)?;
        match serde_json::from_value::<PredictionResult>(value) {
            Ok(result) if result.belongs_to(item) => Some(result),
            Ok(_) => {
                warn!(item_id = %item.item_id, key, "cached prediction belongs to another item; discarding");
                self.cache.invalidate(key);
                None
            }
            Err(err) => {
                warn!(item_id = %item.item_id, key, error = %err, "malformed cached prediction; discarding");
                self.cache.invalidate(key);
                None
            }
        }
    }

    fn compute(&self, item: &InventoryItem) -> PredictionResult {
        let now = self.clock.now();
        let today = now.date_naive();
        let days_since_restock = item.days_since_restock(today);
        let usage = self.usage.estimate(item, today);

        let (days, source) = match self.model_days(item, &usage, days_since_restock) {
            Some(days) => (Some(days), PredictionSource::Model),
            None => (
                fallback_days_until_stockout(item.current_stock, usage.rate),
                PredictionSource::Fallback,
            ),
        };
        // Depleted is depleted, whatever the model says.
        let days = if item.is_depleted() { Some(0.0) } else { days };

        let urgency = self
            .thresholds
            .classify(item.current_stock, item.reorder_level, days);

        PredictionResult {
            item_id: item.item_id.clone(),
            facility_id: item.facility_id.clone(),
            item_name: item.item_name.clone(),
            current_stock: item.current_stock,
            reorder_level: item.reorder_level,
            days_until_stockout: days,
            stockout_date: days.and_then(|d| today.checked_add_days(Days::new(d.floor() as u64))),
            days_until_reorder: days_until_reorder(item.current_stock, item.reorder_level, usage.rate),
            daily_usage_rate: Some(usage.rate),
            urgency,
            priority: urgency.priority(),
            should_reorder: self
                .thresholds
                .should_reorder(item.current_stock, item.reorder_level, days),
            recommended_order_quantity: recommended_order_quantity(
                item.current_stock,
                usage.rate,
                self.config.target_buffer_days,
            ),
            source,
            confidence: source.confidence(),
            computed_at: now,
            reason: None,
        }
    }

    fn model_days(
        &self,
        item: &InventoryItem,
        usage: &UsageEstimate,
        days_since_restock: Option<i64>,
    ) -> Option<f64> {
        if !self.model.is_available() {
            return None;
        }

        let features = FeatureVector::build(item, usage.rate, days_since_restock);
        match self.model.predict_raw(&features) {
            Ok(days) => Some(days),
            Err(err) => {
                warn!(
                    item_id = %item.item_id,
                    facility_id = %item.facility_id,
                    error = %err,
                    "model inference failed; using fallback formula"
                );
                None
            }
        }
    }

    fn predict_or_unknown(&self, item: &InventoryItem) -> PredictionResult {
        match self.predict(item) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    item_id = %item.item_id,
                    facility_id = %item.facility_id,
                    error = %err,
                    "item could not be scored"
                );
                PredictionResult::unknown(item, err.to_string(), self.clock.now())
            }
        }
    }

    /// Predict every item independently.
    ///
    /// Always returns one result per item, in input order. Items that cannot
    /// be scored come back as `UNKNOWN` with a reason.
    pub fn predict_batch(&self, items: &[InventoryItem]) -> Vec<PredictionResult> {
        if items.is_empty() {
            return Vec::new();
        }

        let workers = self.config.batch_workers.clamp(1, items.len());
        let predictions: Vec<PredictionResult> = if workers == 1 {
            items.iter().map(|item| self.predict_or_unknown(item)).collect()
        } else {
            let chunk_size = items.len().div_ceil(workers);
            std::thread::scope(|s| {
                let handles: Vec<_> = items
                    .chunks(chunk_size)
                    .map(|chunk| {
                        let handle = s.spawn(move || {
                            chunk
                                .iter()
                                .map(|item| self.predict_or_unknown(item))
                                .collect::<Vec<_>>()
                        });
                        (chunk, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .flat_map(|(chunk, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            let now = self.clock.now();
                            chunk
                                .iter()
                                .map(|item| PredictionResult::unknown(item, "prediction worker panicked", now))
                                .collect()
                        })
                    })
                    .collect()
            })
        };

        let summary = summarize(&predictions);
        info!(
            items = predictions.len(),
            critical = summary.critical_count,
            warning = summary.warning_count,
            unknown = summary.unknown_count,
            "batch stockout prediction complete"
        );
        predictions
    }

    pub fn predict_with_summary(&self, items: &[InventoryItem]) -> BatchReport {
        let predictions = self.predict_batch(items);
        BatchReport {
            summary: summarize(&predictions),
            predictions,
            generated_at: self.clock.now(),
        }
    }

    /// CRITICAL and WARNING items for one facility.
    pub fn facility_alerts(&self, items: &[InventoryItem], facility_id: &FacilityId) -> FacilityAlerts {
        let at_facility: Vec<InventoryItem> = items
            .iter()
            .filter(|item| &item.facility_id == facility_id)
            .cloned()
            .collect();
        let predictions = self.predict_batch(&at_facility);
        FacilityAlerts::from_predictions(facility_id, &predictions, self.clock.now())
    }
}
