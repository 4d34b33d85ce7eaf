//! Engine configuration.
//!
//! An explicit value handed to [`StockoutPredictor`](crate::StockoutPredictor)
//! at construction; nothing reads settings from globals. Sources are layered
//! defaults → optional file → `STOCKWATCH__*` environment variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use stockwatch_alerts::AlertThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the model artifact is loaded from.
    pub model_path: PathBuf,
    /// TTL for cached predictions. Keep this short (minutes) so stock changes
    /// show up quickly.
    pub cache_ttl_seconds: u64,
    pub cache_max_size: usize,
    pub critical_days: f64,
    pub warning_days: f64,
    pub attention_days: f64,
    /// Days of consumption a reorder should cover.
    pub target_buffer_days: f64,
    /// Usage rate for items without history or a category default.
    pub default_daily_usage: f64,
    /// Per-category default usage rates (keys are matched case-insensitively).
    pub category_usage: BTreeMap<String, f64>,
    /// Worker threads for batch prediction.
    pub batch_workers: usize,
    /// Load the model when the predictor is built instead of on first use.
    pub eager_model_load: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("ml_models/stockout_model.json"),
            cache_ttl_seconds: 300,
            cache_max_size: 1000,
            critical_days: 3.0,
            warning_days: 7.0,
            attention_days: 14.0,
            target_buffer_days: 30.0,
            default_daily_usage: 5.0,
            category_usage: BTreeMap::new(),
            batch_workers: 4,
            eager_model_load: false,
        }
    }
}

impl EngineConfig {
    pub const ENV_PREFIX: &'static str = "STOCKWATCH";

    /// Layer defaults, an optional config file and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineConfig::default())?);

        if let Some(path) = file {
            info!(path = %path.display(), "loading engine configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            critical_days: self.critical_days,
            warning_days: self.warning_days,
            attention_days: self.attention_days,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.cache_max_size == 0 {
            return Err(ConfigError::Invalid("cache_max_size must be greater than zero".into()));
        }
        if self.batch_workers == 0 {
            return Err(ConfigError::Invalid("batch_workers must be at least 1".into()));
        }
        for (name, value) in [
            ("target_buffer_days", self.target_buffer_days),
            ("default_daily_usage", self.default_daily_usage),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite non-negative number (got {value})"
                )));
            }
        }
        if let Some((category, rate)) = self
            .category_usage
            .iter()
            .find(|(_, rate)| !(rate.is_finite() && **rate >= 0.0))
        {
            return Err(ConfigError::Invalid(format!(
                "category_usage[{category}] must be a finite non-negative number (got {rate})"
            )));
        }
        Ok(())
    }
}
