//! # Replay Guard
//!
//! Tracks consumed token ids (or any single-use nonce) until their TTL
//! elapses. The only write path used for consumption is
//! [`ReplayGuard::check_and_mark`], which is a single atomic
//! set-if-absent: there is no window between "not seen" and "marked" in
//! which a second caller could also observe "not seen".
//!
//! ## Durability
//!
//! [`InMemoryReplayGuard`] is **not durable**. Records live in process
//! memory and are lost on crash or restart, at which point any unexpired
//! token that was already consumed can be consumed again. It is suitable
//! for single-process deployments only. Multi-process deployments need a
//! `ReplayGuard` backed by a shared store with native TTL and atomic
//! set-if-not-exists.
//!
//! Memory stays bounded only while [`InMemoryReplayGuard::sweep`] and
//! [`InMemoryReplayGuard::sweep_replay_attempts`] run periodically: records
//! are held until their TTL, and per-principal replay-attempt counters until
//! no attempt has been seen for the retention window
//! ([`DEFAULT_ATTEMPT_RETENTION_SECS`] unless configured).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use govgate_core::{Clock, Principal, Timestamp};
use serde::{Deserialize, Serialize};

/// How long a principal's replay-attempt counter survives without a new
/// attempt.
pub const DEFAULT_ATTEMPT_RETENTION_SECS: u64 = 86_400;

/// Rejected replay attempts by one principal.
#[derive(Debug, Clone, Copy)]
struct AttemptCount {
    count: u64,
    last_at: Timestamp,
}

/// One consumed key and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// The consumed key, normally a token `jti`.
    pub jti: String,
    /// When the key was consumed.
    pub consumed_at: Timestamp,
    /// When the record may be evicted.
    pub ttl_expires_at: Timestamp,
}

/// Store of single-use keys with TTL expiry.
pub trait ReplayGuard: Send + Sync + std::fmt::Debug {
    /// Whether `key` has been marked and its TTL has not yet elapsed.
    fn seen(&self, key: &str) -> bool;

    /// Mark `key` as used for `ttl_secs` seconds, unconditionally.
    fn mark(&self, key: &str, ttl_secs: u64);

    /// Atomically mark `key` if it is not currently marked.
    ///
    /// Returns `true` if this call marked the key, `false` if it was
    /// already present. Exactly one of any set of concurrent callers for
    /// the same key observes `true`.
    fn check_and_mark(&self, key: &str, ttl_secs: u64) -> bool;

    /// Count a rejected replay attempt against `principal`.
    fn record_replay_attempt(&self, principal: &Principal);

    /// Number of rejected replay attempts recorded for `principal`.
    fn replay_attempts(&self, principal: &Principal) -> u64;
}

/// Process-local replay guard on a concurrent hash map. Non-durable.
#[derive(Debug)]
pub struct InMemoryReplayGuard {
    records: DashMap<String, ReplayRecord>,
    attempts: DashMap<Principal, AttemptCount>,
    attempt_retention_secs: u64,
    clock: Arc<dyn Clock>,
}

impl InMemoryReplayGuard {
    /// An empty guard reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            attempts: DashMap::new(),
            attempt_retention_secs: DEFAULT_ATTEMPT_RETENTION_SECS,
            clock,
        }
    }

    /// Keep replay-attempt counters for `secs` after the latest attempt.
    pub fn with_attempt_retention_secs(mut self, secs: u64) -> Self {
        self.attempt_retention_secs = secs;
        self
    }

    fn record(&self, key: &str, ttl_secs: u64) -> ReplayRecord {
        let now = self.clock.now();
        let ttl = i64::try_from(ttl_secs.max(1)).unwrap_or(i64::MAX);
        ReplayRecord {
            jti: key.to_string(),
            consumed_at: now,
            ttl_expires_at: now.plus_secs(ttl),
        }
    }

    /// Evict every record whose TTL elapsed at or before `now`.
    ///
    /// Returns the number of records removed. A record is never removed
    /// before its TTL.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.ttl_expires_at > now);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.records.len(), "replay records swept");
        }
        removed
    }

    /// Drop replay-attempt counters with no attempt inside the retention
    /// window. Returns the number of principals dropped.
    pub fn sweep_replay_attempts(&self, now: Timestamp) -> usize {
        let retention = i64::try_from(self.attempt_retention_secs).unwrap_or(i64::MAX);
        let before = self.attempts.len();
        self.attempts
            .retain(|_, a| a.last_at.plus_secs(retention) > now);
        before.saturating_sub(self.attempts.len())
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record for `key`, if held.
    pub fn get(&self, key: &str) -> Option<ReplayRecord> {
        self.records.get(key).map(|r| r.clone())
    }
}

impl ReplayGuard for InMemoryReplayGuard {
    fn seen(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.records
            .get(key)
            .is_some_and(|r| r.ttl_expires_at > now)
    }

    fn mark(&self, key: &str, ttl_secs: u64) {
        let record = self.record(key, ttl_secs);
        self.records.insert(key.to_string(), record);
    }

    fn check_and_mark(&self, key: &str, ttl_secs: u64) -> bool {
        let record = self.record(key, ttl_secs);
        let now = record.consumed_at;
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().ttl_expires_at > now {
                    false
                } else {
                    existing.insert(record);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    fn record_replay_attempt(&self, principal: &Principal) {
        let now = self.clock.now();
        let mut attempts = self.attempts.entry(principal.clone()).or_insert(AttemptCount {
            count: 0,
            last_at: now,
        });
        attempts.count += 1;
        attempts.last_at = now;
    }

    fn replay_attempts(&self, principal: &Principal) -> u64 {
        self.attempts.get(principal).map(|a| a.count).unwrap_or(0)
    }
}
