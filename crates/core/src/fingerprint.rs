//! Deterministic content fingerprints.
//!
//! A fingerprint is the SHA-256 digest of a value's canonical JSON form
//! (object keys sorted at every level), rendered as lowercase hex. Equal
//! inputs always produce equal fingerprints, regardless of field order or
//! process. Used as cache keys and as dedup keys by callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{DomainError, DomainResult};

/// Hex-encoded SHA-256 digest (always 64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const LEN: usize = 64;

    /// Fingerprint any serializable value.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> DomainResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| DomainError::serialization(format!("fingerprint input: {e}")))?;
        let canonical = serde_json::to_string(&canonicalize(value))
            .map_err(|e| DomainError::serialization(format!("fingerprint input: {e}")))?;
        Ok(Self::of_bytes(canonical.as_bytes()))
    }

    /// Fingerprint raw bytes (no canonicalization).
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// Rebuild objects with sorted keys so the output does not depend on whether
// serde_json was built with `preserve_order`.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn same_input_same_fingerprint() {
        let a = Fingerprint::of(&json!({"item_id": "IT_1", "current_stock": 50})).unwrap();
        let b = Fingerprint::of(&json!({"current_stock": 50, "item_id": "IT_1"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), Fingerprint::LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn distinct_input_distinct_fingerprint() {
        let a = Fingerprint::of(&json!({"item_id": "IT_1", "current_stock": 50})).unwrap();
        let b = Fingerprint::of(&json!({"item_id": "IT_1", "current_stock": 49})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn known_digest_of_plain_string() {
        // sha256("\"abc\"")
        let fp = Fingerprint::of("abc").unwrap();
        assert_eq!(fp, Fingerprint::of_bytes(b"\"abc\""));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: fingerprinting is a pure function of the input.
        #[test]
        fn fingerprint_is_deterministic(
            item in "[A-Z0-9_]{1,20}",
            facility in "[A-Z0-9_]{1,20}",
            stock in 0i64..100_000,
        ) {
            let input = json!({"item_id": item, "facility_id": facility, "current_stock": stock});
            prop_assert_eq!(Fingerprint::of(&input).unwrap(), Fingerprint::of(&input.clone()).unwrap());
        }
    }
}
