//! # Config Subcommand
//!
//! Validate a coordinator YAML file before deploying it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use govgate_coordinator::{ConfigError, CoordinatorConfig};

/// Arguments for `govgate check-config`.
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Path to the coordinator YAML file.
    pub path: PathBuf,
}

/// Exit `0` for a valid file, `1` with every problem listed otherwise.
pub fn run_check_config(args: &CheckConfigArgs) -> Result<u8> {
    match CoordinatorConfig::from_yaml_file(&args.path) {
        Ok(config) => {
            println!("OK: {}", args.path.display());
            match &config.ledger_path {
                Some(path) => println!("  ledger:  {}", path.display()),
                None => println!("  ledger:  in-memory"),
            }
            println!("  token ttl: {}s", config.token_ttl_seconds);
            if let Some(id) = &config.shadow_policy_id {
                println!("  shadow:  {id} ({}ms)", config.shadow_timeout_ms);
            }
            Ok(0)
        }
        Err(ConfigError::Invalid(problems)) => {
            println!("INVALID: {}", args.path.display());
            for problem in &problems {
                println!("  - {problem}");
            }
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}
