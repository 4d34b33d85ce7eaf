//! Shared error model.

use thiserror::Error;

/// Result type used by the pure building blocks.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error raised by pure, deterministic code (validation, identifiers,
/// fingerprinting). Infrastructure failures (IO, model files) have their own
/// error types in the crates that own them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. negative stock).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was empty or malformed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A value could not be turned into its canonical form.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
