//! # Audit Report Export
//!
//! A point-in-time snapshot of the ledger for auditors: every entry plus the
//! result of verifying both the in-memory chain and durable storage.

use std::path::Path;

use govgate_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::chain::HashChainLedger;
use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// Exported audit report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// When the report was generated.
    pub generated_at: Timestamp,
    /// Storage location of the ledger.
    pub ledger: String,
    /// Number of entries.
    pub total_events: usize,
    /// Hash of the last entry.
    pub head_hash: String,
    /// In-memory chain verification result.
    pub chain_valid_memory: bool,
    /// Durable storage verification result.
    pub chain_valid_storage: bool,
    /// First failing index, from whichever check failed first.
    pub first_broken_index: Option<u64>,
    /// All entries in chain order.
    pub events: Vec<LedgerEntry>,
}

impl AuditReport {
    /// Build a report from a live ledger.
    ///
    /// A storage read failure is reported as `chain_valid_storage = false`
    /// rather than an error, so the report can still be produced.
    pub fn generate(ledger: &HashChainLedger, generated_at: Timestamp) -> Self {
        let memory = ledger.verify_chain();
        let storage = match ledger.verify_storage() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "storage verification failed while generating audit report");
                None
            }
        };
        let chain_valid_storage = storage.as_ref().is_some_and(|v| v.is_valid());
        let first_broken_index = memory
            .first_broken_index()
            .or_else(|| storage.as_ref().and_then(|v| v.first_broken_index()));

        Self {
            generated_at,
            ledger: ledger.location(),
            total_events: ledger.len(),
            head_hash: ledger.head_hash().to_hex(),
            chain_valid_memory: memory.is_valid(),
            chain_valid_storage,
            first_broken_index,
            events: ledger.entries(),
        }
    }

    /// Whether both verifications passed.
    pub fn is_clean(&self) -> bool {
        self.chain_valid_memory && self.chain_valid_storage
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json).map_err(LedgerError::Write)?;
        tracing::info!(path = %path.as_ref().display(), events = self.total_events, "audit report exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::LoadOptions;
    use crate::storage::JsonlFileStorage;
    use govgate_core::SystemClock;
    use serde_json::Map;

    #[test]
    fn report_over_clean_file_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonlFileStorage::open(dir.path().join("ledger.jsonl")).unwrap();
        let ledger =
            HashChainLedger::open(Box::new(storage), SystemClock::shared(), LoadOptions::default())
                .unwrap();
        ledger.append("input_filter", Map::new()).unwrap();
        ledger.append("tool_auth", Map::new()).unwrap();

        let report = AuditReport::generate(&ledger, Timestamp::now());
        assert!(report.is_clean());
        assert_eq!(report.total_events, 2);
        assert_eq!(report.first_broken_index, None);
        assert_eq!(report.head_hash, ledger.head_hash().to_hex());

        let out = dir.path().join("report.json");
        report.write_to(&out).unwrap();
        let back: AuditReport =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
