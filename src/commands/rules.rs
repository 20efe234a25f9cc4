// src/commands/rules.rs
//! Rule self-test command

use super::load_config;
use anyhow::{Context, Result};
use pubsync::rules::{load_expectations, run_self_test};
use std::path::Path;

/// Evaluate the configured rules against an expectation table
pub fn cmd_test_rules(table: &Path, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let rules = config.rules()?;
    let expectations = load_expectations(table)
        .with_context(|| format!("Failed to load expectations {}", table.display()))?;

    let report = run_self_test(&rules, &expectations);
    for failure in &report.failures {
        println!("MISMATCH {failure}");
    }
    let checked = report.into_result()?;
    println!("All {checked} rule checks passed");
    Ok(())
}
