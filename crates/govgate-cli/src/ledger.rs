//! # Ledger Subcommands
//!
//! `verify`, `audit` and `repair` over a JSONL ledger file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use govgate_ledger::storage::parse_jsonl;
use govgate_ledger::{
    truncate_incomplete_tail, verify_entries, BrokenLink, ChainVerification, LedgerError,
};

use crate::{open_for_inspection, require_ledger_file, EXIT_INTEGRITY_FAILURE};

/// Arguments for `govgate verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Path to the JSONL ledger.
    pub ledger: PathBuf,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `govgate audit`.
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Path to the JSONL ledger.
    pub ledger: PathBuf,

    /// Decision to print.
    #[arg(long)]
    pub decision_id: String,
}

/// Arguments for `govgate repair`.
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Path to the JSONL ledger.
    pub ledger: PathBuf,
}

/// Verify every stored entry from genesis.
///
/// A malformed record in the middle of the file or a torn final record is
/// reported as a broken link, not as a command error.
pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    require_ledger_file(&args.ledger)?;
    let text = std::fs::read_to_string(&args.ledger)
        .with_context(|| format!("reading ledger {}", args.ledger.display()))?;
    let verification = match parse_jsonl(&text) {
        Ok(log) => match log.incomplete_tail {
            Some(line) => ChainVerification {
                entries: log.entries.len(),
                first_broken: Some(BrokenLink {
                    index: log.entries.len() as u64,
                    reason: format!("incomplete write at line {line}; run `govgate repair`"),
                }),
            },
            None => verify_entries(&log.entries),
        },
        Err(LedgerError::ChainIntegrity { index, reason }) => ChainVerification {
            entries: 0,
            first_broken: Some(BrokenLink { index, reason }),
        },
        Err(e) => return Err(e).context("reading ledger"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verification)?);
    } else {
        match &verification.first_broken {
            None => println!(
                "OK: {} entries verified ({})",
                verification.entries,
                args.ledger.display()
            ),
            Some(broken) => println!(
                "BROKEN: entry {} failed verification: {}",
                broken.index, broken.reason
            ),
        }
    }

    if verification.is_valid() {
        Ok(0)
    } else {
        tracing::error!(index = verification.first_broken_index(), "ledger failed verification");
        Ok(EXIT_INTEGRITY_FAILURE)
    }
}

/// Print every entry recorded for one decision as a JSON array.
pub fn run_audit(args: &AuditArgs) -> Result<u8> {
    let ledger = open_for_inspection(&args.ledger)?;
    let entries = ledger.get_events_by_field("decision_id", &args.decision_id);
    if entries.is_empty() {
        tracing::warn!(decision_id = %args.decision_id, "no entries for decision");
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(0)
}

/// Truncate a torn final record.
pub fn run_repair(args: &RepairArgs) -> Result<u8> {
    let outcome = truncate_incomplete_tail(&args.ledger)
        .with_context(|| format!("repairing ledger {}", args.ledger.display()))?;
    match outcome.removed_line {
        Some(line) => println!(
            "Removed incomplete record at line {line} ({} bytes); {} entries remain",
            outcome.removed_bytes, outcome.entries
        ),
        None => println!("Nothing to repair; {} entries", outcome.entries),
    }
    Ok(0)
}
