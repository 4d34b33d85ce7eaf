//! Daily usage estimation.
//!
//! Preference order:
//! 1. the item's reported `daily_usage_rate`;
//! 2. restock history: assume the last restock filled the item to three times
//!    its reorder level and spread the consumption since then evenly;
//! 3. the configured default for the item's category;
//! 4. the global default.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockwatch_inventory::InventoryItem;

use crate::settings::EngineConfig;

/// Multiple of the reorder level assumed to be on hand right after a restock.
pub const ASSUMED_FULL_STOCK_FACTOR: f64 = 3.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageBasis {
    Reported,
    RestockHistory,
    CategoryDefault,
    GlobalDefault,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEstimate {
    pub rate: f64,
    pub basis: UsageBasis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsagePolicy {
    default_daily_usage: f64,
    category_usage: BTreeMap<String, f64>,
}

impl UsagePolicy {
    pub fn new(default_daily_usage: f64, category_usage: &BTreeMap<String, f64>) -> Self {
        Self {
            default_daily_usage,
            category_usage: category_usage
                .iter()
                .map(|(k, v)| (normalize(k), *v))
                .collect(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.default_daily_usage, &config.category_usage)
    }

    pub fn estimate(&self, item: &InventoryItem, today: NaiveDate) -> UsageEstimate {
        if let Some(rate) = item.daily_usage_rate {
            return UsageEstimate {
                rate,
                basis: UsageBasis::Reported,
            };
        }

        if let Some(days) = item.days_since_restock(today).filter(|d| *d >= 1) {
            let assumed_full = item.reorder_level as f64 * ASSUMED_FULL_STOCK_FACTOR;
            let consumed = assumed_full - item.current_stock as f64;
            if consumed > 0.0 {
                return UsageEstimate {
                    rate: consumed / days as f64,
                    basis: UsageBasis::RestockHistory,
                };
            }
        }

        if let Some(rate) = item
            .category
            .as_deref()
            .and_then(|c| self.category_usage.get(&normalize(c)))
        {
            return UsageEstimate {
                rate: *rate,
                basis: UsageBasis::CategoryDefault,
            };
        }

        UsageEstimate {
            rate: self.default_daily_usage,
            basis: UsageBasis::GlobalDefault,
        }
    }
}

fn normalize(category: &str) -> String {
    category.trim().to_ascii_lowercase()
}
