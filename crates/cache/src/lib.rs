//! `stockwatch-cache`
//!
//! In-memory key/value cache with per-entry TTL and LRU capacity eviction.
//!
//! Eviction policy when full: expired entries are purged first; only if the
//! cache is still at capacity is the least recently used entry evicted.
//! Expiry is otherwise lazy (checked on access).

pub mod error;
pub mod persist;
pub mod ttl;

pub use error::CacheError;
pub use persist::LoadReport;
pub use ttl::{CacheEntry, CacheStats, TtlCache};
