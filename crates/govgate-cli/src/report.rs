//! # Report Subcommands
//!
//! `report` exports the full audit report; `shadow` summarizes production
//! versus shadow decisions and prints the promotion recommendation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use govgate_core::Timestamp;
use govgate_ledger::AuditReport;
use govgate_shadow::ShadowReport;

use crate::{open_for_inspection, EXIT_INTEGRITY_FAILURE};

/// Arguments for `govgate report`.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Path to the JSONL ledger.
    pub ledger: PathBuf,

    /// Where to write the report JSON.
    #[arg(long)]
    pub out: PathBuf,
}

/// Arguments for `govgate shadow`.
#[derive(Args, Debug)]
pub struct ShadowArgs {
    /// Path to the JSONL ledger.
    pub ledger: PathBuf,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Export an audit report. Exits non-zero if either verification failed,
/// after the report has been written.
pub fn run_report(args: &ReportArgs) -> Result<u8> {
    let ledger = open_for_inspection(&args.ledger)?;
    let report = AuditReport::generate(&ledger, Timestamp::now());
    report
        .write_to(&args.out)
        .with_context(|| format!("writing report {}", args.out.display()))?;

    println!(
        "Wrote {} events to {} (memory: {}, storage: {})",
        report.total_events,
        args.out.display(),
        verdict(report.chain_valid_memory),
        verdict(report.chain_valid_storage),
    );
    if report.is_clean() {
        Ok(0)
    } else {
        Ok(EXIT_INTEGRITY_FAILURE)
    }
}

fn verdict(valid: bool) -> &'static str {
    if valid {
        "valid"
    } else {
        "BROKEN"
    }
}

/// Summarize shadow evaluation.
pub fn run_shadow(args: &ShadowArgs) -> Result<u8> {
    let ledger = open_for_inspection(&args.ledger)?;
    let report = ShadowReport::from_entries(&ledger.entries());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    println!("Evaluations:          {}", report.total_evaluations);
    println!(
        "Production blocks:    {} ({:.1}%)",
        report.production_blocks,
        report.production_block_rate * 100.0
    );
    println!(
        "Shadow blocks:        {} ({:.1}%)",
        report.shadow_blocks,
        report.shadow_block_rate * 100.0
    );
    println!("Shadow errors:        {}", report.shadow_errors);
    println!("Divergences:          {}", report.divergences);
    println!("Additional blocks:    {}", report.additional_shadow_blocks);
    println!("Recommendation:       {}", report.recommendation);
    Ok(0)
}
