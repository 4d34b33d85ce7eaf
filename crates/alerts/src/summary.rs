use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_core::{FacilityId, ItemId};
use stockwatch_inventory::{PredictionResult, Urgency};

/// Pointer to an item that needs attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRef {
    pub item_id: ItemId,
    pub facility_id: FacilityId,
    pub item_name: String,
    pub days_until_stockout: Option<f64>,
}

impl From<&PredictionResult> for AlertRef {
    fn from(p: &PredictionResult) -> Self {
        Self {
            item_id: p.item_id.clone(),
            facility_id: p.facility_id.clone(),
            item_name: p.item_name.clone(),
            days_until_stockout: p.days_until_stockout,
        }
    }
}

/// Per-tier counts over a batch of predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_items: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    pub attention_count: usize,
    pub ok_count: usize,
    pub unknown_count: usize,
    /// Most urgent first.
    pub critical_items: Vec<AlertRef>,
    pub warning_items: Vec<AlertRef>,
}

impl Summary {
    pub fn count(&self, urgency: Urgency) -> usize {
        match urgency {
            Urgency::Critical => self.critical_count,
            Urgency::Warning => self.warning_count,
            Urgency::Attention => self.attention_count,
            Urgency::Ok => self.ok_count,
            Urgency::Unknown => self.unknown_count,
        }
    }

    pub fn alert_count(&self) -> usize {
        self.critical_count + self.warning_count
    }
}

/// Aggregate a batch. Pure: only looks at the predictions given.
pub fn summarize(predictions: &[PredictionResult]) -> Summary {
    let mut summary = Summary {
        total_items: predictions.len(),
        ..Summary::default()
    };

    for p in sort_by_priority(predictions.to_vec()) {
        match p.urgency {
            Urgency::Critical => {
                summary.critical_count += 1;
                summary.critical_items.push(AlertRef::from(&p));
            }
            Urgency::Warning => {
                summary.warning_count += 1;
                summary.warning_items.push(AlertRef::from(&p));
            }
            Urgency::Attention => summary.attention_count += 1,
            Urgency::Ok => summary.ok_count += 1,
            Urgency::Unknown => summary.unknown_count += 1,
        }
    }

    summary
}

/// Sort by priority (CRITICAL first), then by days until stockout ascending
/// with "no stockout" last. Stable for ties.
pub fn sort_by_priority(mut predictions: Vec<PredictionResult>) -> Vec<PredictionResult> {
    predictions.sort_by(|a, b| {
        a.urgency
            .priority()
            .cmp(&b.urgency.priority())
            .then_with(|| match (a.days_until_stockout, b.days_until_stockout) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => core::cmp::Ordering::Less,
                (None, Some(_)) => core::cmp::Ordering::Greater,
                (None, None) => core::cmp::Ordering::Equal,
            })
    });
    predictions
}

pub fn filter_by_urgency(predictions: &[PredictionResult], urgency: Urgency) -> Vec<PredictionResult> {
    predictions
        .iter()
        .filter(|p| p.urgency == urgency)
        .cloned()
        .collect()
}

/// CRITICAL and WARNING items for one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityAlerts {
    pub facility_id: FacilityId,
    pub total_items: usize,
    pub alert_count: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    /// Most urgent first.
    pub alerts: Vec<PredictionResult>,
    pub generated_at: DateTime<Utc>,
}

impl FacilityAlerts {
    /// Build from predictions; results for other facilities are ignored.
    pub fn from_predictions(
        facility_id: &FacilityId,
        predictions: &[PredictionResult],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let at_facility: Vec<&PredictionResult> = predictions
            .iter()
            .filter(|p| &p.facility_id == facility_id)
            .collect();

        let alerts = sort_by_priority(
            at_facility
                .iter()
                .filter(|p| p.urgency.is_alert())
                .map(|p| (*p).clone())
                .collect(),
        );
        let critical_count = alerts.iter().filter(|p| p.urgency == Urgency::Critical).count();

        Self {
            facility_id: facility_id.clone(),
            total_items: at_facility.len(),
            alert_count: alerts.len(),
            critical_count,
            warning_count: alerts.len() - critical_count,
            alerts,
            generated_at,
        }
    }
}
