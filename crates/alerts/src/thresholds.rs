use serde::{Deserialize, Serialize};

use stockwatch_core::DomainError;
use stockwatch_inventory::Urgency;

/// Day thresholds for urgency tiers.
///
/// Classification rules, most severe first:
/// - CRITICAL: stock is zero, or `days <= critical_days`
/// - WARNING: `days <= warning_days`, or stock is at/below the reorder level
/// - ATTENTION: `days <= attention_days`
/// - OK: otherwise
///
/// A missing `days` (no depletion signal) matches none of the day rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub critical_days: f64,
    pub warning_days: f64,
    pub attention_days: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical_days: 3.0,
            warning_days: 7.0,
            attention_days: 14.0,
        }
    }
}

impl AlertThresholds {
    pub fn new(critical_days: f64, warning_days: f64, attention_days: f64) -> Result<Self, DomainError> {
        let thresholds = Self {
            critical_days,
            warning_days,
            attention_days,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Thresholds must be finite, non-negative and ordered
    /// `critical <= warning <= attention`.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (name, value) in [
            ("critical_days", self.critical_days),
            ("warning_days", self.warning_days),
            ("attention_days", self.attention_days),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DomainError::validation(format!(
                    "{name} must be a finite non-negative number (got {value})"
                )));
            }
        }
        if self.critical_days > self.warning_days || self.warning_days > self.attention_days {
            return Err(DomainError::validation(format!(
                "thresholds must satisfy critical <= warning <= attention (got {} / {} / {})",
                self.critical_days, self.warning_days, self.attention_days
            )));
        }
        Ok(())
    }

    pub fn classify(&self, current_stock: i64, reorder_level: i64, days_until_stockout: Option<f64>) -> Urgency {
        let within = |limit: f64| days_until_stockout.is_some_and(|d| d <= limit);

        if current_stock == 0 || within(self.critical_days) {
            Urgency::Critical
        } else if within(self.warning_days) || current_stock <= reorder_level {
            Urgency::Warning
        } else if within(self.attention_days) {
            Urgency::Attention
        } else {
            Urgency::Ok
        }
    }

    /// Reorder now: at/below the reorder level or inside the warning window.
    pub fn should_reorder(&self, current_stock: i64, reorder_level: i64, days_until_stockout: Option<f64>) -> bool {
        current_stock <= reorder_level || days_until_stockout.is_some_and(|d| d <= self.warning_days)
    }
}
