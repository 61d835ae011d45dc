//! # Chain Integrity
//!
//! File-backed tamper detection, fail-closed loading, torn-tail handling and
//! property tests over arbitrary append sequences.

use std::path::Path;
use std::sync::Arc;

use govgate_core::SystemClock;
use govgate_ledger::{
    truncate_incomplete_tail, verify_entries, HashChainLedger, JsonlFileStorage, LedgerError,
    LoadOptions, MemoryStorage,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn obj(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn open_file(path: &Path, verify: bool) -> Result<HashChainLedger, LedgerError> {
    let storage = JsonlFileStorage::open(path)?;
    HashChainLedger::open(Box::new(storage), SystemClock::shared(), LoadOptions { verify })
}

fn append_three(ledger: &HashChainLedger) {
    ledger
        .append("input_filter", obj(json!({"request_id": "req_001", "allowed": true})))
        .unwrap();
    ledger
        .append("tool_auth", obj(json!({"tool": "payments", "allowed": true})))
        .unwrap();
    ledger
        .append("drift_detect", obj(json!({"drift_bps": 12, "alert": false})))
        .unwrap();
}

/// Rewrite line `index` of the JSONL file with `data.allowed` flipped.
fn tamper_data(path: &Path, index: usize) {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut entry: Value = serde_json::from_str(&lines[index]).unwrap();
    entry["data"]["allowed"] = Value::Bool(false);
    lines[index] = serde_json::to_string(&entry).unwrap();
    std::fs::write(path, format!("{}\n", lines.join("\n"))).unwrap();
}

#[test]
fn tampering_with_a_stored_entry_is_reported_at_its_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    {
        let ledger = open_file(&path, true).unwrap();
        append_three(&ledger);
        assert!(ledger.verify_chain().is_valid());
    }

    tamper_data(&path, 1);

    let unverified = open_file(&path, false).unwrap();
    let verification = unverified.verify_chain();
    assert!(!verification.is_valid());
    assert_eq!(verification.first_broken_index(), Some(1));
    assert!(!unverified.is_verified());
}

#[test]
fn verified_load_refuses_a_tampered_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    append_three(&open_file(&path, true).unwrap());
    tamper_data(&path, 1);

    let err = open_file(&path, true).unwrap_err();
    assert_eq!(err.code(), "CHAIN_INTEGRITY_FAILED");
    assert!(matches!(err, LedgerError::ChainIntegrity { index: 1, .. }));
}

#[test]
fn reopened_ledger_continues_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let head = {
        let ledger = open_file(&path, true).unwrap();
        append_three(&ledger);
        ledger.head_hash()
    };
    let ledger = open_file(&path, true).unwrap();
    assert!(ledger.is_verified());
    assert_eq!(ledger.head_hash(), head);
    let next = ledger.append("execution", Map::new()).unwrap();
    assert_eq!(next.index, 3);
    assert_eq!(next.previous_hash, head);
    assert!(ledger.verify_storage().unwrap().is_valid());
}

#[test]
fn torn_tail_blocks_verification_until_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    append_three(&open_file(&path, true).unwrap());

    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("{\"index\":3,\"timestamp\":\"2026-");
    std::fs::write(&path, &text).unwrap();

    assert!(matches!(
        open_file(&path, true),
        Err(LedgerError::IncompleteWrite { line: 4 })
    ));

    let degraded = open_file(&path, false).unwrap();
    assert!(!degraded.is_verified());
    assert_eq!(degraded.len(), 3);
    assert!(matches!(
        degraded.append("execution", Map::new()),
        Err(LedgerError::IncompleteWrite { .. })
    ));
    drop(degraded);

    let outcome = truncate_incomplete_tail(&path).unwrap();
    assert_eq!(outcome.entries, 3);
    let repaired = open_file(&path, true).unwrap();
    assert!(repaired.is_verified());
    assert_eq!(repaired.append("execution", Map::new()).unwrap().index, 3);
}

#[test]
fn concurrent_appends_are_serialized() {
    let ledger = Arc::new(
        HashChainLedger::open(
            Box::new(MemoryStorage::new()),
            SystemClock::shared(),
            LoadOptions::default(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for i in 0..25 {
                    ledger
                        .append("tool_auth", obj(json!({"thread": t, "seq": i})))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(ledger.len(), 400);
    assert!(ledger.verify_chain().is_valid());
    assert!(ledger.verify_storage().unwrap().is_valid());
    for (i, e) in ledger.entries().iter().enumerate() {
        assert_eq!(e.index, i as u64);
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn event() -> impl Strategy<Value = (String, Map<String, Value>)> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9_ ]{0,20}".prop_map(Value::String),
    ];
    (
        "[a-z_]{1,16}",
        prop::collection::btree_map("[a-z]{1,8}", leaf, 0..5)
            .prop_map(|m| m.into_iter().collect::<Map<String, Value>>()),
    )
}

fn build(events: &[(String, Map<String, Value>)]) -> HashChainLedger {
    let ledger = HashChainLedger::open(
        Box::new(MemoryStorage::new()),
        SystemClock::shared(),
        LoadOptions::default(),
    )
    .unwrap();
    for (event_type, data) in events {
        ledger.append(event_type, data.clone()).unwrap();
    }
    ledger
}

proptest! {
    #[test]
    fn any_append_sequence_verifies(events in prop::collection::vec(event(), 0..20)) {
        let ledger = build(&events);
        prop_assert_eq!(ledger.len(), events.len());
        prop_assert!(ledger.verify_chain().is_valid());
    }

    #[test]
    fn data_mutation_is_detected_at_the_mutated_index(
        events in prop::collection::vec(event(), 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut entries = build(&events).entries();
        let k = pick.index(entries.len());
        entries[k].data.insert("__tampered".into(), Value::Bool(true));
        prop_assert_eq!(verify_entries(&entries).first_broken_index(), Some(k as u64));
    }

    #[test]
    fn link_mutation_is_detected_at_the_mutated_index(
        events in prop::collection::vec(event(), 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut entries = build(&events).entries();
        let k = pick.index(entries.len());
        let mut bytes = *entries[k].previous_hash.as_bytes();
        bytes[0] ^= 0xff;
        entries[k].previous_hash = govgate_core::ContentDigest::new(bytes);
        prop_assert_eq!(verify_entries(&entries).first_broken_index(), Some(k as u64));
    }
}
