use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_core::{DomainError, FacilityId, ItemId};

use crate::item::InventoryItem;

/// Urgency tier attached to a prediction.
///
/// Serialized as the literal strings `OK`, `ATTENTION`, `WARNING`,
/// `CRITICAL` and `UNKNOWN`, which downstream consumers format directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Ok,
    Attention,
    Warning,
    Critical,
    /// The item could not be scored (invalid data).
    Unknown,
}

impl Urgency {
    /// Tiers in ascending severity (excludes `Unknown`).
    pub const TIERS: [Urgency; 4] = [
        Urgency::Ok,
        Urgency::Attention,
        Urgency::Warning,
        Urgency::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Ok => "OK",
            Urgency::Attention => "ATTENTION",
            Urgency::Warning => "WARNING",
            Urgency::Critical => "CRITICAL",
            Urgency::Unknown => "UNKNOWN",
        }
    }

    /// Rank for ordering tiers; `None` for `Unknown`, which is not a tier.
    pub fn severity(&self) -> Option<u8> {
        match self {
            Urgency::Ok => Some(0),
            Urgency::Attention => Some(1),
            Urgency::Warning => Some(2),
            Urgency::Critical => Some(3),
            Urgency::Unknown => None,
        }
    }

    /// Display priority, 1 = act first.
    pub fn priority(&self) -> u8 {
        match self {
            Urgency::Critical => 1,
            Urgency::Warning => 2,
            Urgency::Attention => 3,
            Urgency::Ok => 4,
            Urgency::Unknown => 5,
        }
    }

    /// CRITICAL and WARNING are pushed to alerting.
    pub fn is_alert(&self) -> bool {
        matches!(self, Urgency::Critical | Urgency::Warning)
    }
}

impl core::fmt::Display for Urgency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OK" => Ok(Urgency::Ok),
            "ATTENTION" => Ok(Urgency::Attention),
            "WARNING" => Ok(Urgency::Warning),
            "CRITICAL" => Ok(Urgency::Critical),
            "UNKNOWN" => Ok(Urgency::Unknown),
            other => Err(DomainError::validation(format!("unknown urgency level: {other}"))),
        }
    }
}

/// Which code path produced a prediction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredictionSource {
    Model,
    Fallback,
}

impl PredictionSource {
    /// Confidence reported alongside results from this source.
    pub fn confidence(&self) -> f64 {
        match self {
            PredictionSource::Model => 0.8,
            PredictionSource::Fallback => 0.6,
        }
    }
}

/// Stockout prediction for one item at one facility.
///
/// Immutable once produced; a fresh computation supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub item_id: ItemId,
    pub facility_id: FacilityId,
    pub item_name: String,
    pub current_stock: i64,
    pub reorder_level: i64,
    /// `None` means no foreseeable stockout (or the item could not be scored).
    pub days_until_stockout: Option<f64>,
    pub stockout_date: Option<NaiveDate>,
    /// Days until stock reaches the reorder level; 0 when already there.
    pub days_until_reorder: Option<f64>,
    pub daily_usage_rate: Option<f64>,
    pub urgency: Urgency,
    pub priority: u8,
    pub should_reorder: bool,
    pub recommended_order_quantity: u64,
    pub source: PredictionSource,
    /// 0.0 for `UNKNOWN`.
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
    /// Why the item could not be scored; only set for `UNKNOWN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PredictionResult {
    /// Result for an item that could not be scored.
    pub fn unknown(item: &InventoryItem, reason: impl Into<String>, computed_at: DateTime<Utc>) -> Self {
        Self {
            item_id: item.item_id.clone(),
            facility_id: item.facility_id.clone(),
            item_name: item.item_name.clone(),
            current_stock: item.current_stock,
            reorder_level: item.reorder_level,
            days_until_stockout: None,
            stockout_date: None,
            days_until_reorder: None,
            daily_usage_rate: None,
            urgency: Urgency::Unknown,
            priority: Urgency::Unknown.priority(),
            should_reorder: false,
            recommended_order_quantity: 0,
            source: PredictionSource::Fallback,
            confidence: 0.0,
            computed_at,
            reason: Some(reason.into()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.urgency == Urgency::Unknown
    }

    /// Whether this result was computed for `item` (same identity).
    pub fn belongs_to(&self, item: &InventoryItem) -> bool {
        self.item_id == item.item_id && self.facility_id == item.facility_id
    }
}
