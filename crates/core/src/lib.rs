//! `stockwatch-core`: shared building blocks.
//!
//! This crate contains **pure** primitives used by every other crate in the
//! workspace: the error model, item/facility identifiers, content fingerprints
//! and the clock abstraction. No IO, no logging.

pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod id;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use fingerprint::Fingerprint;
pub use id::{FacilityId, ItemId};
