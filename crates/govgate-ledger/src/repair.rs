//! # Operator Repair
//!
//! Truncating a torn final record is the only permitted non-append mutation
//! of a ledger file. Nothing in the library calls this; it exists for the
//! operator `repair` command.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::LedgerError;
use crate::storage::parse_jsonl;

/// What a repair did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Line number of the removed record, if one was removed.
    pub removed_line: Option<usize>,
    /// Number of bytes removed.
    pub removed_bytes: u64,
    /// Complete entries remaining.
    pub entries: usize,
}

/// Remove an incomplete final record from the JSONL ledger at `path`.
///
/// A file without a torn tail is left untouched. Corruption elsewhere in the
/// file is not repaired and is returned as `ChainIntegrity`.
pub fn truncate_incomplete_tail(path: impl AsRef<Path>) -> Result<RepairOutcome, LedgerError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(LedgerError::Read)?;
    let log = parse_jsonl(&text)?;

    let Some(line) = log.incomplete_tail else {
        return Ok(RepairOutcome {
            removed_line: None,
            removed_bytes: 0,
            entries: log.entries.len(),
        });
    };

    // Keep everything up to and including the newline that ends the last
    // complete record.
    let body = text.trim_end_matches(['\n', '\r', ' ', '\t']);
    let keep = if text.ends_with('\n') {
        body.rfind('\n').map(|i| i + 1).unwrap_or(0)
    } else {
        text.rfind('\n').map(|i| i + 1).unwrap_or(0)
    };
    let removed_bytes = (text.len() - keep) as u64;

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(LedgerError::Write)?;
    file.set_len(keep as u64).map_err(LedgerError::Write)?;
    file.sync_all().map_err(LedgerError::Write)?;

    tracing::warn!(
        path = %path.display(),
        line,
        removed_bytes,
        entries = log.entries.len(),
        "truncated incomplete ledger tail"
    );

    Ok(RepairOutcome {
        removed_line: Some(line),
        removed_bytes,
        entries: log.entries.len(),
    })
}
