use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockwatch_core::{DomainError, FacilityId, ItemId};

/// Snapshot of one item's stock at one facility, as supplied by ingestion.
///
/// Stock quantities are signed so that a bad snapshot (e.g. `-1`) can be
/// represented and rejected per item by [`validate`](Self::validate) instead of
/// failing the whole batch at deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: ItemId,
    pub facility_id: FacilityId,
    pub item_name: String,
    pub current_stock: i64,
    pub reorder_level: i64,
    /// `None` means no restock history.
    #[serde(default)]
    pub last_restock_date: Option<NaiveDate>,
    /// Used to pick a default usage rate when no history is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Reported average consumption per day, if the source tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_usage_rate: Option<f64>,
}

impl InventoryItem {
    pub fn new(
        item_id: impl Into<ItemId>,
        facility_id: impl Into<FacilityId>,
        item_name: impl Into<String>,
        current_stock: i64,
        reorder_level: i64,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            facility_id: facility_id.into(),
            item_name: item_name.into(),
            current_stock,
            reorder_level,
            last_restock_date: None,
            category: None,
            daily_usage_rate: None,
        }
    }

    pub fn with_last_restock_date(mut self, date: NaiveDate) -> Self {
        self.last_restock_date = Some(date);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_daily_usage_rate(mut self, rate: f64) -> Self {
        self.daily_usage_rate = Some(rate);
        self
    }

    /// Check the record can be scored.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.item_id.is_blank() {
            return Err(DomainError::validation("item_id cannot be empty"));
        }
        if self.facility_id.is_blank() {
            return Err(DomainError::validation("facility_id cannot be empty"));
        }
        if self.current_stock < 0 {
            return Err(DomainError::validation(format!(
                "current_stock cannot be negative (got {})",
                self.current_stock
            )));
        }
        if self.reorder_level < 0 {
            return Err(DomainError::validation(format!(
                "reorder_level cannot be negative (got {})",
                self.reorder_level
            )));
        }
        if let Some(rate) = self.daily_usage_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(DomainError::validation(format!(
                    "daily_usage_rate must be a finite non-negative number (got {rate})"
                )));
            }
        }
        Ok(())
    }

    /// Whole days between the last restock and `today`; `None` without history.
    ///
    /// A restock date in the future yields a negative number; callers treat
    /// anything below one day as "just restocked".
    pub fn days_since_restock(&self, today: NaiveDate) -> Option<i64> {
        self.last_restock_date
            .map(|restocked| (today - restocked).num_days())
    }

    pub fn is_depleted(&self) -> bool {
        self.current_stock == 0
    }

    pub fn is_at_or_below_reorder_level(&self) -> bool {
        self.current_stock <= self.reorder_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(stock: i64, reorder: i64) -> InventoryItem {
        InventoryItem::new("ITPHC_00001", "PHC_00003", "Paracetamol 500mg", stock, reorder)
    }

    #[test]
    fn validate_accepts_well_formed_item() {
        assert!(item(50, 30).validate().is_ok());
        assert!(item(0, 0).validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_stock() {
        let err = item(-1, 30).validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("current_stock")),
            _ => panic!("Expected Validation error for negative stock"),
        }
    }

    #[test]
    fn validate_rejects_negative_reorder_level() {
        assert!(matches!(
            item(10, -5).validate(),
            Err(DomainError::Validation(msg)) if msg.contains("reorder_level")
        ));
    }

    #[test]
    fn validate_rejects_blank_ids_and_bad_usage() {
        let mut blank = item(10, 5);
        blank.facility_id = FacilityId::new(" ");
        assert!(blank.validate().is_err());

        assert!(item(10, 5).with_daily_usage_rate(f64::NAN).validate().is_err());
        assert!(item(10, 5).with_daily_usage_rate(-1.0).validate().is_err());
    }

    #[test]
    fn days_since_restock_counts_calendar_days() {
        let today = NaiveDate::from_ymd_opt(2024, 10, 15).unwrap();
        let restocked = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        assert_eq!(item(1, 1).days_since_restock(today), None);
        assert_eq!(
            item(1, 1).with_last_restock_date(restocked).days_since_restock(today),
            Some(14)
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: validity depends only on the sign of the stock fields.
            #[test]
            fn validity_follows_stock_sign(stock in -1_000i64..1_000, reorder in -1_000i64..1_000) {
                let valid = item(stock, reorder).validate().is_ok();
                prop_assert_eq!(valid, stock >= 0 && reorder >= 0);
            }
        }
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let json = r#"{
            "item_id": "ITPHC_00001",
            "facility_id": "PHC_00003",
            "item_name": "ORS sachet",
            "current_stock": 50,
            "reorder_level": 30,
            "last_restock_date": "2024-09-01"
        }"#;
        let parsed: InventoryItem = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.current_stock, 50);
        assert_eq!(parsed.last_restock_date, NaiveDate::from_ymd_opt(2024, 9, 1));
        assert_eq!(parsed.category, None);
        assert_eq!(parsed.daily_usage_rate, None);
    }
}
