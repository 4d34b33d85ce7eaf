use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use stockwatch_inventory::InventoryItem;

/// Headline stock figures computed straight from item snapshots, without
/// running predictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStatus {
    pub total_items: usize,
    /// At or below 1.2 × reorder level.
    pub low_stock_count: usize,
    /// At or below the reorder level.
    pub at_reorder_count: usize,
    pub depleted_count: usize,
    pub facilities_covered: usize,
}

impl InventoryStatus {
    pub const LOW_STOCK_FACTOR: f64 = 1.2;

    pub fn from_items(items: &[InventoryItem]) -> Self {
        let facilities: BTreeSet<&str> = items.iter().map(|i| i.facility_id.as_str()).collect();

        Self {
            total_items: items.len(),
            low_stock_count: items
                .iter()
                .filter(|i| i.current_stock as f64 <= i.reorder_level as f64 * Self::LOW_STOCK_FACTOR)
                .count(),
            at_reorder_count: items.iter().filter(|i| i.is_at_or_below_reorder_level()).count(),
            depleted_count: items.iter().filter(|i| i.is_depleted()).count(),
            facilities_covered: facilities.len(),
        }
    }
}
