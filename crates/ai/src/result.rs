use thiserror::Error;

use stockwatch_cache::CacheError;
use stockwatch_core::DomainError;

use crate::settings::ConfigError;

/// Per-request prediction failure.
///
/// Every variant is recoverable: the predictor either falls back to the
/// formula (`ModelUnavailable`, `InferenceFailure`) or reports the item as
/// `UNKNOWN` (`InvalidItemData`). None of them abort a batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictionError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    InferenceFailure(String),

    #[error("invalid item data: {0}")]
    InvalidItemData(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for PredictionError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::InvalidItemData(msg),
            DomainError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

/// Failure to assemble a predictor (bad configuration).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
