use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockwatch_core::DomainError;
use stockwatch_inventory::InventoryItem;

/// Inputs the stockout model is trained on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    StockLevel,
    ReorderLevel,
    DaysSinceRestock,
    DailyUsageRate,
    StockToReorderRatio,
    IsBelowReorder,
    DaysOfSupply,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::StockLevel,
        Feature::ReorderLevel,
        Feature::DaysSinceRestock,
        Feature::DailyUsageRate,
        Feature::StockToReorderRatio,
        Feature::IsBelowReorder,
        Feature::DaysOfSupply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::StockLevel => "stock_level",
            Feature::ReorderLevel => "reorder_level",
            Feature::DaysSinceRestock => "days_since_restock",
            Feature::DailyUsageRate => "daily_usage_rate",
            Feature::StockToReorderRatio => "stock_to_reorder_ratio",
            Feature::IsBelowReorder => "is_below_reorder",
            Feature::DaysOfSupply => "days_of_supply",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Feature {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown feature: {s}")))
    }
}

/// Dense feature vector, indexed by [`Feature`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    values: [f64; 7],
}

impl FeatureVector {
    /// Build features for one item. Missing restock history counts as zero
    /// days since restock.
    pub fn build(item: &InventoryItem, daily_usage_rate: f64, days_since_restock: Option<i64>) -> Self {
        let stock = item.current_stock as f64;
        let reorder = item.reorder_level as f64;

        let mut values = [0.0; 7];
        values[Feature::StockLevel.index()] = stock;
        values[Feature::ReorderLevel.index()] = reorder;
        values[Feature::DaysSinceRestock.index()] = days_since_restock.unwrap_or(0).max(0) as f64;
        values[Feature::DailyUsageRate.index()] = daily_usage_rate;
        values[Feature::StockToReorderRatio.index()] = stock / reorder.max(1.0);
        values[Feature::IsBelowReorder.index()] = if item.is_at_or_below_reorder_level() { 1.0 } else { 0.0 };
        values[Feature::DaysOfSupply.index()] = stock / daily_usage_rate.max(0.1);
        Self { values }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.into_iter().map(|f| (f, self.get(f)))
    }
}
