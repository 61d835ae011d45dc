//! # HashChainLedger
//!
//! Append-only log of decision and audit events, each entry bound to its
//! predecessor by hash.
//!
//! ## Concurrency
//!
//! Single writer, many readers. `append` holds the writer lock for the whole
//! read-head → seal → persist → publish sequence, so `index` and
//! `previous_hash` are never raced. The published chain sits behind a
//! `RwLock`; readers clone a snapshot and never block the writer for longer
//! than the push.
//!
//! ## Fail-closed semantics
//!
//! - A storage error during `append` is returned to the caller and the
//!   in-memory chain is left unchanged. The writer then halts: every later
//!   append fails with `WriterHalted` until the ledger is reopened from
//!   storage, so no entry is ever sealed against a head that storage may
//!   not share.
//! - `open` with verification refuses to return a ledger whose stored chain
//!   does not verify, or whose storage ends with a torn write.
//! - A ledger opened without verification over a torn tail is readable but
//!   refuses appends until an operator truncates the tail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use govgate_core::{Clock, ContentDigest};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::storage::LedgerStorage;

/// Event type recorded after a successful chain verification.
pub const CHAIN_VERIFIED_EVENT: &str = "chain_verified";

/// Options for [`HashChainLedger::open`].
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Re-verify every stored entry while loading.
    pub verify: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { verify: true }
    }
}

/// The first entry that failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    /// Index of the failing entry.
    pub index: u64,
    /// Description of the failure.
    pub reason: String,
}

/// Result of verifying a chain end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Number of entries examined.
    pub entries: usize,
    /// First failure, if any.
    pub first_broken: Option<BrokenLink>,
}

impl ChainVerification {
    /// True iff every hash and link verified.
    pub fn is_valid(&self) -> bool {
        self.first_broken.is_none()
    }

    /// Index of the first broken entry, if any.
    pub fn first_broken_index(&self) -> Option<u64> {
        self.first_broken.as_ref().map(|b| b.index)
    }
}

/// Verify a sequence of entries from genesis.
pub fn verify_entries(entries: &[LedgerEntry]) -> ChainVerification {
    let mut previous = ContentDigest::zero();
    for (i, entry) in entries.iter().enumerate() {
        if let Err(fault) = entry.validate(i as u64, &previous) {
            return ChainVerification {
                entries: entries.len(),
                first_broken: Some(BrokenLink {
                    index: i as u64,
                    reason: fault.to_string(),
                }),
            };
        }
        previous = entry.hash;
    }
    ChainVerification {
        entries: entries.len(),
        first_broken: None,
    }
}

#[derive(Debug)]
struct ChainState {
    entries: Vec<LedgerEntry>,
    head: ContentDigest,
}

/// The hash-chained decision ledger.
pub struct HashChainLedger {
    writer: Mutex<Box<dyn LedgerStorage>>,
    state: RwLock<ChainState>,
    clock: Arc<dyn Clock>,
    incomplete_tail: Option<usize>,
    verified_on_load: bool,
    halted: AtomicBool,
}

impl std::fmt::Debug for HashChainLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("HashChainLedger")
            .field("entries", &state.entries.len())
            .field("head", &state.head.to_hex())
            .field("incomplete_tail", &self.incomplete_tail)
            .field("verified_on_load", &self.verified_on_load)
            .field("halted", &self.is_halted())
            .finish()
    }
}

impl HashChainLedger {
    /// Reconstruct the ledger from durable storage.
    ///
    /// With `verify`, any hash or link mismatch fails with
    /// `ChainIntegrity` and a torn final record fails with
    /// `IncompleteWrite`: the ledger refuses to come up.
    pub fn open(
        storage: Box<dyn LedgerStorage>,
        clock: Arc<dyn Clock>,
        options: LoadOptions,
    ) -> Result<Self, LedgerError> {
        let location = storage.location();
        let loaded = storage.load()?;

        if options.verify {
            if let Some(line) = loaded.incomplete_tail {
                tracing::error!(ledger = %location, line, "ledger storage ends with an incomplete write");
                return Err(LedgerError::IncompleteWrite { line });
            }
            let verification = verify_entries(&loaded.entries);
            if let Some(broken) = verification.first_broken {
                tracing::error!(
                    ledger = %location,
                    index = broken.index,
                    reason = %broken.reason,
                    "ledger integrity failed at load"
                );
                return Err(LedgerError::ChainIntegrity {
                    index: broken.index,
                    reason: broken.reason,
                });
            }
        } else if let Some(line) = loaded.incomplete_tail {
            tracing::warn!(ledger = %location, line, "ledger opened unverified over an incomplete write; appends disabled");
        }

        let head = loaded
            .entries
            .last()
            .map(|e| e.hash)
            .unwrap_or_else(ContentDigest::zero);

        tracing::info!(
            ledger = %location,
            entries = loaded.entries.len(),
            verified = options.verify,
            "ledger loaded"
        );

        Ok(Self {
            writer: Mutex::new(storage),
            state: RwLock::new(ChainState {
                entries: loaded.entries,
                head,
            }),
            clock,
            incomplete_tail: loaded.incomplete_tail,
            verified_on_load: options.verify,
            halted: AtomicBool::new(false),
        })
    }

    /// Append an event and durably persist it before returning.
    ///
    /// # Errors
    ///
    /// `Write` when storage fails, `Canonicalization` when `data` cannot be
    /// hashed, `IncompleteWrite` when storage has a torn tail, `WriterHalted`
    /// after an earlier storage failure. In every error case nothing is added
    /// to the chain.
    pub fn append(
        &self,
        event_type: &str,
        data: Map<String, Value>,
    ) -> Result<LedgerEntry, LedgerError> {
        if let Some(line) = self.incomplete_tail {
            return Err(LedgerError::IncompleteWrite { line });
        }

        let mut writer = self.writer.lock();
        if self.is_halted() {
            return Err(LedgerError::WriterHalted);
        }
        let (index, previous_hash) = {
            let state = self.state.read();
            (state.entries.len() as u64, state.head)
        };

        let entry = LedgerEntry::seal(index, self.clock.now(), event_type, data, previous_hash)?;

        if let Err(e) = writer.append(&entry) {
            self.halted.store(true, Ordering::Release);
            tracing::error!(index, event_type, error = %e, "ledger append failed; entry not recorded, writer halted");
            return Err(e);
        }

        {
            let mut state = self.state.write();
            state.head = entry.hash;
            state.entries.push(entry.clone());
        }
        drop(writer);

        tracing::debug!(index, event_type, hash = %entry.hash, "ledger entry appended");
        Ok(entry)
    }

    /// Append an event whose payload is any serializable JSON object.
    pub fn append_json(&self, event_type: &str, data: Value) -> Result<LedgerEntry, LedgerError> {
        match data {
            Value::Object(map) => self.append(event_type, map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                self.append(event_type, map)
            }
        }
    }

    /// Recompute every hash and confirm linkage from genesis.
    pub fn verify_chain(&self) -> ChainVerification {
        let verification = verify_entries(&self.state.read().entries);
        match &verification.first_broken {
            Some(broken) => tracing::error!(
                index = broken.index,
                reason = %broken.reason,
                "chain verification failed"
            ),
            None => tracing::info!(entries = verification.entries, "chain integrity verified"),
        }
        verification
    }

    /// Re-read durable storage and verify it independently of memory.
    pub fn verify_storage(&self) -> Result<ChainVerification, LedgerError> {
        let loaded = self.writer.lock().load()?;
        if let Some(line) = loaded.incomplete_tail {
            return Ok(ChainVerification {
                entries: loaded.entries.len(),
                first_broken: Some(BrokenLink {
                    index: loaded.entries.len() as u64,
                    reason: format!("incomplete write at line {line}"),
                }),
            });
        }
        let verification = verify_entries(&loaded.entries);
        if verification.is_valid() && loaded.entries.len() != self.len() {
            tracing::warn!(
                stored = loaded.entries.len(),
                memory = self.len(),
                "stored chain length differs from memory"
            );
        }
        Ok(verification)
    }

    /// Verify the chain and, if it holds, append a `chain_verified` event.
    pub fn verify_and_record(&self) -> Result<LedgerEntry, LedgerError> {
        let verification = self.verify_chain();
        if let Some(broken) = verification.first_broken {
            return Err(LedgerError::ChainIntegrity {
                index: broken.index,
                reason: broken.reason,
            });
        }
        let head = self.head_hash();
        let mut data = Map::new();
        data.insert("entries".into(), Value::from(verification.entries as u64));
        data.insert("head_hash".into(), Value::from(head.to_hex()));
        self.append(CHAIN_VERIFIED_EVENT, data)
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.read().entries.clone()
    }

    /// The entry at `index`, if present.
    pub fn get(&self, index: u64) -> Option<LedgerEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.state.read().entries.get(i).cloned())
    }

    /// Entries with the given `event_type`.
    pub fn get_events_by_type(&self, event_type: &str) -> Vec<LedgerEntry> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Entries whose `data[key]` is the string `value` (e.g. `decision_id`).
    pub fn get_events_by_field(&self, key: &str, value: &str) -> Vec<LedgerEntry> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.data_str(key) == Some(value))
            .cloned()
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash of the last entry, or the genesis hash for an empty chain.
    pub fn head_hash(&self) -> ContentDigest {
        self.state.read().head
    }

    /// Whether the stored chain was verified when the ledger was opened.
    pub fn is_verified(&self) -> bool {
        self.verified_on_load && self.incomplete_tail.is_none()
    }

    /// Whether a failed write has halted appends.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Line number of a torn final record, if storage has one.
    pub fn incomplete_tail(&self) -> Option<usize> {
        self.incomplete_tail
    }

    /// Storage location, for logs and reports.
    pub fn location(&self) -> String {
        self.writer.lock().location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LoadedLog, MemoryStorage};
    use govgate_core::{ManualClock, SystemClock, Timestamp};

    /// Persists every entry but reports failure for the `fail_on`-th append,
    /// like a write that lands before `sync_data` fails.
    #[derive(Debug)]
    struct WritesThenFails {
        inner: Arc<Mutex<MemoryStorage>>,
        fail_on: usize,
        appended: usize,
    }

    impl LedgerStorage for WritesThenFails {
        fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
            let n = self.appended;
            self.appended += 1;
            self.inner.lock().append(entry)?;
            if n == self.fail_on {
                return Err(LedgerError::Write(std::io::Error::other("sync failed")));
            }
            Ok(())
        }

        fn load(&self) -> Result<LoadedLog, LedgerError> {
            self.inner.lock().load()
        }

        fn location(&self) -> String {
            "writes-then-fails".to_string()
        }
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn ledger() -> HashChainLedger {
        HashChainLedger::open(
            Box::new(MemoryStorage::new()),
            SystemClock::shared(),
            LoadOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn empty_ledger_starts_at_genesis() {
        let l = ledger();
        assert!(l.is_empty());
        assert_eq!(l.head_hash(), ContentDigest::zero());
        assert!(l.verify_chain().is_valid());
        assert!(l.is_verified());
    }

    #[test]
    fn appends_link_to_predecessor() {
        let l = ledger();
        let a = l.append("input_filter", obj(serde_json::json!({"user_id": "u1"}))).unwrap();
        let b = l.append("tool_auth", obj(serde_json::json!({"tool": "db"}))).unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(a.previous_hash, ContentDigest::zero());
        assert_eq!(b.index, 1);
        assert_eq!(b.previous_hash, a.hash);
        assert_eq!(l.head_hash(), b.hash);
        assert_eq!(l.get(1), Some(b));
        assert!(l.verify_chain().is_valid());
    }

    #[test]
    fn timestamps_come_from_the_injected_clock() {
        let start = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let l = HashChainLedger::open(Box::new(MemoryStorage::new()), clock.clone(), LoadOptions::default())
            .unwrap();
        let e = l.append("x", Map::new()).unwrap();
        assert_eq!(e.timestamp, start);
        clock.advance_secs(5);
        assert_eq!(l.append("x", Map::new()).unwrap().timestamp, start.plus_secs(5));
    }

    #[test]
    fn queries_filter_by_type_and_field() {
        let l = ledger();
        l.append("decision_production", obj(serde_json::json!({"decision_id": "D1"}))).unwrap();
        l.append("decision_shadow", obj(serde_json::json!({"decision_id": "D1"}))).unwrap();
        l.append("decision_production", obj(serde_json::json!({"decision_id": "D2"}))).unwrap();
        assert_eq!(l.get_events_by_type("decision_production").len(), 2);
        assert_eq!(l.get_events_by_field("decision_id", "D1").len(), 2);
        assert!(l.get_events_by_field("decision_id", "D9").is_empty());
    }

    #[test]
    fn verify_and_record_appends_a_chain_verified_event() {
        let l = ledger();
        l.append("a", Map::new()).unwrap();
        let head = l.head_hash();
        let rec = l.verify_and_record().unwrap();
        assert_eq!(rec.event_type, CHAIN_VERIFIED_EVENT);
        assert_eq!(rec.data_str("head_hash"), Some(head.to_hex().as_str()));
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn append_json_wraps_non_objects() {
        let l = ledger();
        let e = l.append_json("note", Value::from("hello")).unwrap();
        assert_eq!(e.data_str("value"), Some("hello"));
    }

    #[test]
    fn failed_write_halts_appends_until_reopened() {
        let shared = Arc::new(Mutex::new(MemoryStorage::new()));
        let storage = WritesThenFails {
            inner: shared.clone(),
            fail_on: 2,
            appended: 0,
        };
        let l = HashChainLedger::open(Box::new(storage), SystemClock::shared(), LoadOptions::default())
            .unwrap();
        l.append("a", Map::new()).unwrap();
        l.append("b", Map::new()).unwrap();
        assert!(matches!(l.append("c", Map::new()), Err(LedgerError::Write(_))));
        assert!(l.is_halted());

        let err = l.append("d", Map::new()).unwrap_err();
        assert!(matches!(err, LedgerError::WriterHalted));
        assert_eq!(err.code(), "LEDGER_WRITE_FAILED");
        assert_eq!(l.len(), 2);

        // Storage kept the unacknowledged entry; a reopened ledger adopts it
        // and links new entries after it.
        let text = shared.lock().text().to_string();
        let reopened = HashChainLedger::open(
            Box::new(MemoryStorage::from_text(text)),
            SystemClock::shared(),
            LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.append("d", Map::new()).unwrap().index, 3);
        assert!(reopened.verify_chain().is_valid());
    }

    #[test]
    fn float_payload_is_rejected_and_nothing_is_recorded() {
        let l = ledger();
        let err = l.append("drift", obj(serde_json::json!({"score": 0.5}))).unwrap_err();
        assert_eq!(err.code(), "LEDGER_WRITE_FAILED");
        assert!(l.is_empty());
    }
}
