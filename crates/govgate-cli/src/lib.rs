//! # govgate-cli: Operator Command-Line Interface
//!
//! ## Subcommands
//!
//! - `govgate verify`: recompute every hash and link of a ledger file
//! - `govgate audit`: print the entries recorded for one decision
//! - `govgate report`: export an audit report
//! - `govgate shadow`: production versus shadow summary and promotion advice
//! - `govgate repair`: truncate a torn final record
//! - `govgate check-config`: validate a coordinator YAML file
//!
//! ```bash
//! govgate verify /var/lib/govgate/ledger.jsonl
//! govgate audit /var/lib/govgate/ledger.jsonl --decision-id 6f1c...
//! govgate report /var/lib/govgate/ledger.jsonl --out audit.json
//! ```
//!
//! Handlers return the process exit code: `0` success, `2` when the ledger
//! fails verification. Errors map to `1` in `main`.

pub mod config;
pub mod ledger;
pub mod report;

use std::path::Path;

use anyhow::{Context, Result};
use govgate_core::SystemClock;
use govgate_ledger::{HashChainLedger, JsonlFileStorage, LoadOptions};

/// Exit code for a ledger that does not verify.
pub const EXIT_INTEGRITY_FAILURE: u8 = 2;

/// Fail unless `path` is an existing regular file. Inspection commands
/// never create a ledger.
pub fn require_ledger_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("ledger file not found: {}", path.display());
    }
    Ok(())
}

/// Open a ledger file for inspection without failing on corruption.
///
/// Inspection commands must still work on a damaged ledger, so loading
/// never verifies here; each command verifies explicitly.
pub fn open_for_inspection(path: &Path) -> Result<HashChainLedger> {
    require_ledger_file(path)?;
    let storage = JsonlFileStorage::open(path)
        .with_context(|| format!("opening ledger {}", path.display()))?;
    HashChainLedger::open(
        Box::new(storage),
        SystemClock::shared(),
        LoadOptions { verify: false },
    )
    .with_context(|| format!("loading ledger {}", path.display()))
}
