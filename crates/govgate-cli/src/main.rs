//! # govgate CLI entry point
//!
//! Parses arguments, sets up logging and dispatches to the handler modules.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use govgate_cli::config::{run_check_config, CheckConfigArgs};
use govgate_cli::ledger::{run_audit, run_repair, run_verify, AuditArgs, RepairArgs, VerifyArgs};
use govgate_cli::report::{run_report, run_shadow, ReportArgs, ShadowArgs};

/// govgate operator tooling.
///
/// Inspects and maintains the hash-chained decision ledger.
#[derive(Parser, Debug)]
#[command(name = "govgate", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify every hash and link of a ledger file.
    Verify(VerifyArgs),

    /// Print the ledger entries for one decision.
    Audit(AuditArgs),

    /// Export an audit report.
    Report(ReportArgs),

    /// Summarize shadow evaluation and recommend promotion or not.
    Shadow(ShadowArgs),

    /// Truncate an incomplete final record.
    Repair(RepairArgs),

    /// Validate a coordinator config file.
    CheckConfig(CheckConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let result = match &cli.command {
        Commands::Verify(args) => run_verify(args),
        Commands::Audit(args) => run_audit(args),
        Commands::Report(args) => run_report(args),
        Commands::Shadow(args) => run_shadow(args),
        Commands::Repair(args) => run_repair(args),
        Commands::CheckConfig(args) => run_check_config(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
