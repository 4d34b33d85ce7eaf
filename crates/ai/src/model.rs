//! Model artifact loading and inference.
//!
//! The model is trained elsewhere and shipped as a JSON artifact. Loading is
//! fail-open: a missing or incompatible artifact leaves the loader in an
//! "unavailable" state with the reason recorded, and predictions use the
//! fallback formula instead.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockwatch_core::SharedClock;

use crate::features::{Feature, FeatureVector};
use crate::result::PredictionError;

/// A loaded stockout model: maps features to days until stockout.
pub trait StockoutModel: Send + Sync + core::fmt::Debug {
    fn kind(&self) -> &str;

    fn predict_days(&self, features: &FeatureVector) -> Result<f64, PredictionError>;
}

/// On-disk artifact format for linear stockout models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelArtifact {
    pub format: String,
    pub version: u32,
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
    /// Upper bound applied to predictions, if set.
    #[serde(default)]
    pub clamp_max_days: Option<f64>,
}

impl LinearModelArtifact {
    pub const FORMAT: &'static str = "stockout-linear";
    pub const VERSION: u32 = 1;
}

/// `days = intercept + Σ weight × feature`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    intercept: f64,
    weights: Vec<(Feature, f64)>,
    clamp_max_days: Option<f64>,
}

impl LinearModel {
    pub fn from_artifact(artifact: LinearModelArtifact) -> anyhow::Result<Self> {
        if artifact.format != LinearModelArtifact::FORMAT {
            bail!(
                "unsupported model format {:?} (expected {:?})",
                artifact.format,
                LinearModelArtifact::FORMAT
            );
        }
        if artifact.version != LinearModelArtifact::VERSION {
            bail!(
                "unsupported model version {} (expected {})",
                artifact.version,
                LinearModelArtifact::VERSION
            );
        }
        if !artifact.intercept.is_finite() {
            bail!("intercept is not finite");
        }
        if let Some(max) = artifact.clamp_max_days {
            if !(max.is_finite() && max >= 0.0) {
                bail!("clamp_max_days must be a finite non-negative number");
            }
        }

        let weights = artifact
            .weights
            .into_iter()
            .map(|(name, weight)| -> anyhow::Result<(Feature, f64)> {
                let feature = name.parse::<Feature>()?;
                if !weight.is_finite() {
                    bail!("weight for {name} is not finite");
                }
                Ok((feature, weight))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            intercept: artifact.intercept,
            weights,
            clamp_max_days: artifact.clamp_max_days,
        })
    }
}

impl StockoutModel for LinearModel {
    fn kind(&self) -> &str {
        LinearModelArtifact::FORMAT
    }

    fn predict_days(&self, features: &FeatureVector) -> Result<f64, PredictionError> {
        let days = self
            .weights
            .iter()
            .fold(self.intercept, |acc, (feature, weight)| acc + weight * features.get(*feature));
        Ok(match self.clamp_max_days {
            Some(max) => days.min(max),
            None => days,
        })
    }
}

/// Availability state of the model, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelHandle {
    pub is_loaded: bool,
    pub model_path: PathBuf,
    pub load_error: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub model_kind: Option<String>,
    pub size_bytes: Option<u64>,
}

impl ModelHandle {
    fn not_attempted(model_path: PathBuf) -> Self {
        Self {
            is_loaded: false,
            model_path,
            load_error: None,
            loaded_at: None,
            model_kind: None,
            size_bytes: None,
        }
    }
}

#[derive(Debug)]
struct LoadedState {
    handle: ModelHandle,
    model: Option<Arc<dyn StockoutModel>>,
}

/// Owns the process-wide model.
///
/// The model is loaded once (eagerly via [`ensure_loaded`](Self::ensure_loaded)
/// or lazily on first use); concurrent first users share a single load attempt.
/// Readers only ever see a fully constructed model: the new state is built
/// outside the lock and swapped in whole.
#[derive(Debug)]
pub struct ModelLoader {
    path: PathBuf,
    state: RwLock<Option<Arc<LoadedState>>>,
    load_lock: Mutex<()>,
    load_attempts: AtomicU64,
    clock: SharedClock,
}

impl ModelLoader {
    pub fn new(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(None),
            load_lock: Mutex::new(()),
            load_attempts: AtomicU64::new(0),
            clock,
        }
    }

    /// Loader that already holds `model` (embedding or tests).
    pub fn with_model(model: Arc<dyn StockoutModel>, clock: SharedClock) -> Self {
        let loader = Self::new(PathBuf::from("<in-memory>"), clock);
        let handle = ModelHandle {
            is_loaded: true,
            model_path: loader.path.clone(),
            load_error: None,
            loaded_at: Some(loader.clock.now()),
            model_kind: Some(model.kind().to_string()),
            size_bytes: None,
        };
        loader.install(LoadedState {
            handle,
            model: Some(model),
        });
        loader
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> Option<Arc<LoadedState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, state: LoadedState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(state));
    }

    /// Load the configured artifact unless a load was already attempted.
    pub fn ensure_loaded(&self) -> ModelHandle {
        if let Some(state) = self.current() {
            return state.handle.clone();
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished loading while we waited.
        if let Some(state) = self.current() {
            return state.handle.clone();
        }
        self.load_locked(&self.path.clone())
    }

    /// Load (or replace) the model from `path`. Never fails: on error the
    /// returned handle has `is_loaded == false` and `load_error` set.
    pub fn load(&self, path: impl AsRef<Path>) -> ModelHandle {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_locked(path.as_ref())
    }

    /// Re-read the configured artifact.
    pub fn reload(&self) -> ModelHandle {
        self.load(self.path.clone())
    }

    fn load_locked(&self, path: &Path) -> ModelHandle {
        self.load_attempts.fetch_add(1, Ordering::Relaxed);

        let state = match read_artifact(path) {
            Ok((model, size_bytes)) => {
                let handle = ModelHandle {
                    is_loaded: true,
                    model_path: path.to_path_buf(),
                    load_error: None,
                    loaded_at: Some(self.clock.now()),
                    model_kind: Some(model.kind().to_string()),
                    size_bytes: Some(size_bytes),
                };
                info!(path = %path.display(), size_bytes, kind = model.kind(), "stockout model loaded");
                LoadedState {
                    handle,
                    model: Some(Arc::new(model)),
                }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(path = %path.display(), error = %reason, "stockout model unavailable; predictions will use the fallback formula");
                LoadedState {
                    handle: ModelHandle {
                        load_error: Some(reason),
                        ..ModelHandle::not_attempted(path.to_path_buf())
                    },
                    model: None,
                }
            }
        };

        let handle = state.handle.clone();
        self.install(state);
        handle
    }

    /// Current state without triggering a load.
    pub fn handle(&self) -> ModelHandle {
        self.current()
            .map(|s| s.handle.clone())
            .unwrap_or_else(|| ModelHandle::not_attempted(self.path.clone()))
    }

    pub fn load_attempts(&self) -> u64 {
        self.load_attempts.load(Ordering::Relaxed)
    }

    /// Whether inference can be attempted. Triggers the first load if needed.
    pub fn is_available(&self) -> bool {
        self.ensure_loaded().is_loaded
    }

    /// Run the model. Errors, panics and invalid outputs (negative or not
    /// finite) are all reported as `InferenceFailure`.
    pub fn predict_raw(&self, features: &FeatureVector) -> Result<f64, PredictionError> {
        self.ensure_loaded();
        let state = self
            .current()
            .ok_or_else(|| PredictionError::ModelUnavailable("model load not attempted".into()))?;
        let model = state.model.as_ref().ok_or_else(|| {
            PredictionError::ModelUnavailable(
                state
                    .handle
                    .load_error
                    .clone()
                    .unwrap_or_else(|| "model not loaded".into()),
            )
        })?;

        let days = catch_unwind(AssertUnwindSafe(|| model.predict_days(features)))
            .map_err(|_| PredictionError::InferenceFailure("model panicked during inference".into()))??;

        if !days.is_finite() || days < 0.0 {
            return Err(PredictionError::InferenceFailure(format!(
                "model returned invalid days_until_stockout: {days}"
            )));
        }
        Ok(days)
    }
}

fn read_artifact(path: &Path) -> anyhow::Result<(LinearModel, u64)> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read model artifact {}", path.display()))?;
    let artifact: LinearModelArtifact =
        serde_json::from_slice(&bytes).context("model artifact is not a valid stockout model document")?;
    let model = LinearModel::from_artifact(artifact).context("incompatible model artifact")?;
    Ok((model, bytes.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockwatch_core::SystemClock;
    use stockwatch_inventory::InventoryItem;

    fn write_artifact(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("stockout_model.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn supply_model_json() -> &'static str {
        r#"{"format":"stockout-linear","version":1,"intercept":0.0,"weights":{"days_of_supply":1.0}}"#
    }

    fn features(stock: i64, rate: f64) -> FeatureVector {
        FeatureVector::build(&InventoryItem::new("IT_1", "PHC_1", "ORS", stock, 30), rate, Some(5))
    }

    #[derive(Debug)]
    struct FixedModel(f64);

    impl StockoutModel for FixedModel {
        fn kind(&self) -> &str {
            "fixed"
        }

        fn predict_days(&self, _features: &FeatureVector) -> Result<f64, PredictionError> {
            Ok(self.0)
        }
    }

    #[derive(Debug)]
    struct PanickingModel;

    impl StockoutModel for PanickingModel {
        fn kind(&self) -> &str {
            "panicking"
        }

        fn predict_days(&self, _features: &FeatureVector) -> Result<f64, PredictionError> {
            panic!("boom")
        }
    }

    #[test]
    fn missing_artifact_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModelLoader::new(dir.path().join("absent.json"), SystemClock::shared());

        let handle = loader.ensure_loaded();
        assert!(!handle.is_loaded);
        assert!(handle.load_error.as_deref().unwrap().contains("failed to read model artifact"));
        assert!(!loader.is_available());

        let err = loader.predict_raw(&features(50, 2.5)).unwrap_err();
        assert!(matches!(err, PredictionError::ModelUnavailable(_)));
    }

    #[test]
    fn corrupt_artifact_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&dir, "{ not json");
        let handle = ModelLoader::new(&path, SystemClock::shared()).ensure_loaded();
        assert!(!handle.is_loaded);
        assert!(handle.load_error.unwrap().contains("not a valid stockout model document"));
    }

    #[test]
    fn incompatible_artifact_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(
            &dir,
            r#"{"format":"stockout-linear","version":1,"intercept":0.0,"weights":{"moon_phase":1.0}}"#,
        );
        let handle = ModelLoader::new(&path, SystemClock::shared()).ensure_loaded();
        assert!(!handle.is_loaded);
        let error = handle.load_error.unwrap();
        assert!(error.contains("incompatible model artifact"));
        assert!(error.contains("unknown feature: moon_phase"));

        let path = write_artifact(
            &dir,
            r#"{"format":"gradient-boosting","version":1,"intercept":0.0,"weights":{}}"#,
        );
        assert!(!ModelLoader::new(&path, SystemClock::shared()).ensure_loaded().is_loaded);
    }

    #[test]
    fn valid_artifact_loads_and_predicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&dir, supply_model_json());
        let loader = ModelLoader::new(&path, SystemClock::shared());

        assert!(loader.is_available());
        let handle = loader.handle();
        assert_eq!(handle.model_kind.as_deref(), Some("stockout-linear"));
        assert_eq!(handle.size_bytes, Some(supply_model_json().len() as u64));
        assert!(handle.loaded_at.is_some());

        let days = loader.predict_raw(&features(50, 2.5)).unwrap();
        assert!((days - 20.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_caps_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(
            &dir,
            r#"{"format":"stockout-linear","version":1,"intercept":500.0,"weights":{},"clamp_max_days":365.0}"#,
        );
        let loader = ModelLoader::new(&path, SystemClock::shared());
        assert_eq!(loader.predict_raw(&features(50, 2.5)).unwrap(), 365.0);
    }

    #[test]
    fn handle_does_not_trigger_load() {
        let loader = ModelLoader::new("absent.json", SystemClock::shared());
        let handle = loader.handle();
        assert!(!handle.is_loaded);
        assert_eq!(handle.load_error, None);
        assert_eq!(loader.load_attempts(), 0);
    }

    #[test]
    fn reload_picks_up_new_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockout_model.json");
        let loader = ModelLoader::new(&path, SystemClock::shared());
        assert!(!loader.is_available());

        std::fs::write(&path, supply_model_json()).unwrap();
        // Lazy loading does not retry on its own.
        assert!(!loader.is_available());
        assert!(loader.reload().is_loaded);
        assert!(loader.is_available());
        assert_eq!(loader.load_attempts(), 2);
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&dir, supply_model_json());
        let loader = Arc::new(ModelLoader::new(&path, SystemClock::shared()));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let loader = loader.clone();
                s.spawn(move || assert!(loader.is_available()));
            }
        });

        assert_eq!(loader.load_attempts(), 1);
    }

    #[test]
    fn invalid_outputs_are_inference_failures() {
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let loader = ModelLoader::with_model(Arc::new(FixedModel(bad)), SystemClock::shared());
            let err = loader.predict_raw(&features(50, 2.5)).unwrap_err();
            assert!(matches!(err, PredictionError::InferenceFailure(_)));
        }
    }

    #[test]
    fn panicking_model_is_contained() {
        let loader = ModelLoader::with_model(Arc::new(PanickingModel), SystemClock::shared());
        let err = loader.predict_raw(&features(50, 2.5)).unwrap_err();
        assert!(matches!(err, PredictionError::InferenceFailure(msg) if msg.contains("panicked")));
    }
}
