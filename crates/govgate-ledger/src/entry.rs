//! # Ledger Entries
//!
//! ## Hash Derivation
//!
//! ```text
//! hash = SHA256(JCS({index, timestamp, event_type, data, previous_hash}))
//! ```
//!
//! i.e. the canonical JSON of the entry with only the `hash` key removed.
//! The timestamp is inside the hash.
//!
//! ## Integrity Invariants
//!
//! - `entry[0].previous_hash == GENESIS_HASH`
//! - `entry[i].previous_hash == entry[i-1].hash` for all `i > 0`
//! - `entry[i].index == i`
//! - `entry[i].hash == compute_entry_hash(entry[i] without hash)`

use govgate_core::{sha256_digest, CanonicalBytes, ContentDigest, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LedgerError;

/// One immutable, hash-linked record in the audit chain.
///
/// Unknown keys are rejected on deserialization: a field smuggled into a
/// stored line would otherwise be dropped before the hash is recomputed and
/// go unnoticed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerEntry {
    /// Position in the chain, starting at 0.
    pub index: u64,
    /// When the entry was appended.
    pub timestamp: Timestamp,
    /// Event discriminator, e.g. `decision_production`.
    pub event_type: String,
    /// Event payload.
    pub data: Map<String, Value>,
    /// Hash of the preceding entry, or the genesis hash.
    pub previous_hash: ContentDigest,
    /// Hash of this entry without the `hash` field.
    pub hash: ContentDigest,
}

/// The hashed portion of an entry.
#[derive(Serialize)]
struct EntryPayload<'a> {
    index: u64,
    timestamp: &'a Timestamp,
    event_type: &'a str,
    data: &'a Map<String, Value>,
    previous_hash: &'a ContentDigest,
}

/// Compute the hash an entry with these fields must carry.
pub fn compute_entry_hash(
    index: u64,
    timestamp: &Timestamp,
    event_type: &str,
    data: &Map<String, Value>,
    previous_hash: &ContentDigest,
) -> Result<ContentDigest, LedgerError> {
    let canonical = entry_payload_bytes(index, timestamp, event_type, data, previous_hash)?;
    Ok(sha256_digest(&canonical))
}

fn entry_payload_bytes(
    index: u64,
    timestamp: &Timestamp,
    event_type: &str,
    data: &Map<String, Value>,
    previous_hash: &ContentDigest,
) -> Result<CanonicalBytes, LedgerError> {
    let payload = EntryPayload {
        index,
        timestamp,
        event_type,
        data,
        previous_hash,
    };
    Ok(CanonicalBytes::new(&payload)?)
}

/// Why an entry failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryFault {
    /// `index` is not the entry's position.
    IndexMismatch { expected: u64, actual: u64 },
    /// `previous_hash` does not equal the predecessor's hash.
    BrokenLink { expected: String, actual: String },
    /// Stored `hash` does not equal the recomputed hash.
    HashMismatch { stored: String, computed: String },
    /// The entry cannot be canonicalized at all.
    Unhashable(String),
}

impl std::fmt::Display for EntryFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexMismatch { expected, actual } => {
                write!(f, "index mismatch: expected {expected}, got {actual}")
            }
            Self::BrokenLink { expected, actual } => {
                write!(f, "previous_hash mismatch: expected {expected}, got {actual}")
            }
            Self::HashMismatch { stored, computed } => {
                write!(f, "hash mismatch: stored {stored}, computed {computed}")
            }
            Self::Unhashable(reason) => write!(f, "entry cannot be hashed: {reason}"),
        }
    }
}

impl LedgerEntry {
    /// Build and seal an entry.
    pub fn seal(
        index: u64,
        timestamp: Timestamp,
        event_type: impl Into<String>,
        data: Map<String, Value>,
        previous_hash: ContentDigest,
    ) -> Result<Self, LedgerError> {
        let event_type = event_type.into();
        let hash = compute_entry_hash(index, &timestamp, &event_type, &data, &previous_hash)?;
        Ok(Self {
            index,
            timestamp,
            event_type,
            data,
            previous_hash,
            hash,
        })
    }

    /// Canonical bytes of the hashed portion of this entry.
    ///
    /// This is the payload submitted to external backends; its SHA-256 is
    /// `self.hash` when the entry is intact.
    pub fn payload_bytes(&self) -> Result<CanonicalBytes, LedgerError> {
        entry_payload_bytes(
            self.index,
            &self.timestamp,
            &self.event_type,
            &self.data,
            &self.previous_hash,
        )
    }

    /// Recompute the hash from the entry's current contents.
    pub fn recompute_hash(&self) -> Result<ContentDigest, LedgerError> {
        compute_entry_hash(
            self.index,
            &self.timestamp,
            &self.event_type,
            &self.data,
            &self.previous_hash,
        )
    }

    /// Check position, linkage and hash.
    pub fn validate(
        &self,
        expected_index: u64,
        expected_previous: &ContentDigest,
    ) -> Result<(), EntryFault> {
        if self.index != expected_index {
            return Err(EntryFault::IndexMismatch {
                expected: expected_index,
                actual: self.index,
            });
        }
        if &self.previous_hash != expected_previous {
            return Err(EntryFault::BrokenLink {
                expected: expected_previous.to_hex(),
                actual: self.previous_hash.to_hex(),
            });
        }
        let computed = self
            .recompute_hash()
            .map_err(|e| EntryFault::Unhashable(e.to_string()))?;
        if computed != self.hash {
            return Err(EntryFault::HashMismatch {
                stored: self.hash.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }

    /// A string field of `data`, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// A boolean field of `data`, if present.
    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govgate_core::GENESIS_HASH;

    fn ts() -> Timestamp {
        Timestamp::parse("2026-01-15T12:00:00Z").unwrap()
    }

    fn data() -> Map<String, Value> {
        let v = serde_json::json!({"request_id": "req_001", "user_id": "user_001", "allowed": true});
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn genesis_entry_matches_known_vector() {
        let entry = LedgerEntry::seal(0, ts(), "input_filter", data(), ContentDigest::zero()).unwrap();
        assert_eq!(entry.previous_hash.to_hex(), GENESIS_HASH);
        assert_eq!(
            entry.hash.to_hex(),
            "bc2ea438404406bf2343342df27f1eb3ddc00f6157882dfcdacebaf0a56c9a23"
        );
        assert!(entry.validate(0, &ContentDigest::zero()).is_ok());
    }

    #[test]
    fn payload_bytes_hash_to_entry_hash() {
        let entry = LedgerEntry::seal(0, ts(), "input_filter", data(), ContentDigest::zero()).unwrap();
        assert_eq!(sha256_digest(&entry.payload_bytes().unwrap()), entry.hash);
        assert!(!entry.payload_bytes().unwrap().to_text().contains("\"hash\""));
    }

    #[test]
    fn tampered_data_is_a_hash_mismatch() {
        let mut entry = LedgerEntry::seal(0, ts(), "tool_auth", data(), ContentDigest::zero()).unwrap();
        entry.data.insert("allowed".into(), Value::Bool(false));
        assert!(matches!(
            entry.validate(0, &ContentDigest::zero()),
            Err(EntryFault::HashMismatch { .. })
        ));
    }

    #[test]
    fn tampered_timestamp_is_detected() {
        let mut entry = LedgerEntry::seal(0, ts(), "tool_auth", data(), ContentDigest::zero()).unwrap();
        entry.timestamp = ts().plus_secs(1);
        assert!(entry.validate(0, &ContentDigest::zero()).is_err());
    }

    #[test]
    fn wrong_position_or_link_is_reported_before_hash() {
        let entry = LedgerEntry::seal(3, ts(), "x", Map::new(), ContentDigest::zero()).unwrap();
        assert!(matches!(
            entry.validate(2, &ContentDigest::zero()),
            Err(EntryFault::IndexMismatch { expected: 2, actual: 3 })
        ));
        let other = ContentDigest::new([7u8; 32]);
        assert!(matches!(entry.validate(3, &other), Err(EntryFault::BrokenLink { .. })));
    }

    #[test]
    fn unknown_keys_are_rejected_on_load() {
        let entry = LedgerEntry::seal(0, ts(), "x", Map::new(), ContentDigest::zero()).unwrap();
        let mut value = serde_json::to_value(&entry).unwrap();
        value["extra"] = Value::from(1);
        assert!(serde_json::from_value::<LedgerEntry>(value).is_err());
    }

    #[test]
    fn float_data_cannot_be_sealed() {
        let mut d = Map::new();
        d.insert("score".into(), serde_json::json!(0.12));
        assert!(matches!(
            LedgerEntry::seal(0, ts(), "drift_detect", d, ContentDigest::zero()),
            Err(LedgerError::Canonicalization(_))
        ));
    }
}
