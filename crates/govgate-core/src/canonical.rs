//! # Canonical Serialization: JCS-Compatible Byte Production
//!
//! Defines `CanonicalBytes`, the sole construction path for bytes that are
//! hashed or signed anywhere in govgate.
//!
//! ## Security Invariant
//!
//! The inner field is private. The only constructors run the coercion
//! pipeline (float rejection) and then serialize with `serde_jcs`
//! (RFC 8785): object keys sorted, compact separators, no extraneous
//! whitespace. A ledger entry hashed in one process therefore hashes to the
//! same value in any other process that re-reads it.
//!
//! ## Why floats are rejected
//!
//! Floating point numbers have several valid textual forms and are the
//! classic source of cross-implementation hash drift. Amounts must be
//! carried as integers (minor units) or strings.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization with float rejection.
///
/// # Invariants
///
/// - Object keys are sorted lexicographically (by UTF-16 code units, per JCS).
/// - Separators are compact (`,` and `:`), no whitespace.
/// - No float values are present anywhere in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::FloatRejected` if the value contains a
    /// non-integer number, or `SerializationFailed` if serde fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Construct canonical bytes from an already-built JSON value.
    ///
    /// Used when a field must be stripped before hashing (the ledger drops
    /// `hash` from an entry before recomputing it).
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        let coerced = coerce_json_value(value)?;
        let s = serde_jcs::to_string(&coerced)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interpret the canonical bytes as UTF-8 text.
    ///
    /// Canonical bytes are always valid UTF-8 because they are produced by a
    /// JSON serializer; the lossy fallback is never taken in practice.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Recursively validate a JSON tree, rejecting floats.
fn coerce_json_value(value: Value) -> Result<Value, CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(value),
        Value::Number(ref n) => {
            if !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(value)
        }
        Value::Object(map) => {
            let mut coerced = serde_json::Map::new();
            for (k, v) in map {
                coerced.insert(k, coerce_json_value(v)?);
            }
            Ok(Value::Object(coerced))
        }
        Value::Array(arr) => {
            let coerced: Result<Vec<_>, _> = arr.into_iter().map(coerce_json_value).collect();
            Ok(Value::Array(coerced?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &Value) -> String {
        CanonicalBytes::new(v).expect("canonicalize").to_text()
    }

    #[test]
    fn sorts_keys_with_compact_separators() {
        let data = serde_json::json!({"b": 2, "a": 1, "c": "hello"});
        assert_eq!(text(&data), r#"{"a":1,"b":2,"c":"hello"}"#);
    }

    #[test]
    fn nested_objects_are_sorted() {
        let data = serde_json::json!({
            "outer": {"b": 2, "a": 1},
            "list": [3, 2, 1]
        });
        assert_eq!(text(&data), r#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn ledger_shaped_entry_matches_sort_keys_compact_form() {
        // json.dumps(obj, sort_keys=True, separators=(",", ":"))
        let data = serde_json::json!({
            "index": 0,
            "timestamp": "2026-01-15T12:00:00Z",
            "event_type": "input_filter",
            "data": {"user_id": "user_001", "allowed": true},
            "previous_hash": "0".repeat(64),
        });
        let expected = format!(
            r#"{{"data":{{"allowed":true,"user_id":"user_001"}},"event_type":"input_filter","index":0,"previous_hash":"{}","timestamp":"2026-01-15T12:00:00Z"}}"#,
            "0".repeat(64)
        );
        assert_eq!(text(&data), expected);
    }

    #[test]
    fn float_is_rejected_anywhere_in_the_tree() {
        let shallow = serde_json::json!({"amount": 1.5});
        match CanonicalBytes::new(&shallow) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 1.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
        let deep = serde_json::json!({"a": {"b": [{"c": 3.25}]}});
        assert!(CanonicalBytes::new(&deep).is_err());
    }

    #[test]
    fn integers_nulls_and_bools_pass_through() {
        let data = serde_json::json!({"amount": 500000, "neg": -42, "k": null, "f": false});
        assert_eq!(text(&data), r#"{"amount":500000,"f":false,"k":null,"neg":-42}"#);
    }

    #[test]
    fn empty_containers() {
        assert_eq!(CanonicalBytes::new(&serde_json::json!({})).unwrap().as_bytes(), b"{}");
        assert_eq!(CanonicalBytes::new(&serde_json::json!([])).unwrap().as_bytes(), b"[]");
    }

    #[test]
    fn unicode_is_not_escaped() {
        let data = serde_json::json!({"name": "\u{00e9}t\u{00e9}"});
        assert!(text(&data).contains('\u{00e9}'));
    }

    #[test]
    fn from_value_matches_new() {
        let data = serde_json::json!({"z": [1, 2], "a": {"y": "x"}});
        let a = CanonicalBytes::new(&data).unwrap();
        let b = CanonicalBytes::from_value(data).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert_eq!(a.len(), a.as_bytes().len());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn json_value_no_floats() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
            "[a-zA-Z0-9_ ]{0,40}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,10}", inner, 0..8)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonicalization_is_deterministic(value in json_value_no_floats()) {
            let a = CanonicalBytes::new(&value).unwrap();
            let b = CanonicalBytes::new(&value).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        #[test]
        fn canonical_output_reparses_to_the_same_value(value in json_value_no_floats()) {
            let cb = CanonicalBytes::new(&value).unwrap();
            let parsed: Value = serde_json::from_slice(cb.as_bytes()).unwrap();
            prop_assert_eq!(parsed, value);
        }

        #[test]
        fn recanonicalizing_is_a_fixed_point(value in json_value_no_floats()) {
            let once = CanonicalBytes::new(&value).unwrap();
            let parsed: Value = serde_json::from_slice(once.as_bytes()).unwrap();
            let twice = CanonicalBytes::new(&parsed).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
