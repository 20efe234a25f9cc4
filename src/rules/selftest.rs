// src/rules/selftest.rs

//! Rule self-test
//!
//! Checks a table of expected filter outcomes against the resolved rules
//! without touching any store or backend. The table is a TOML document:
//!
//! ```toml
//! [slc7_x86-64.ROOT]
//! "v6-28-04-1" = true
//! "v5-34-30-1" = false
//! ```

use super::RuleSet;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info};

/// arch -> package -> version -> expected outcome
pub type RuleExpectations = BTreeMap<String, BTreeMap<String, BTreeMap<String, bool>>>;

/// Load an expectation table from a TOML file
pub fn load_expectations(path: &Path) -> Result<RuleExpectations> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Cannot read {}: {e}", path.display())))?;
    Ok(toml::from_str(&content)?)
}

/// One entry whose outcome differs from the expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestFailure {
    pub arch: String,
    pub package: String,
    pub version: String,
    pub expected: bool,
    pub actual: bool,
}

impl std::fmt::Display for SelfTestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{}: expected {}, got {}",
            self.arch,
            self.package,
            self.version,
            outcome(self.expected),
            outcome(self.actual)
        )
    }
}

fn outcome(included: bool) -> &'static str {
    if included { "included" } else { "excluded" }
}

/// Outcome of a self-test run
#[derive(Debug, Clone, Default)]
pub struct SelfTestReport {
    pub checked: usize,
    pub failures: Vec<SelfTestFailure>,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn mismatches into a hard error
    pub fn into_result(self) -> Result<usize> {
        if self.passed() {
            return Ok(self.checked);
        }
        let lines: Vec<String> = self.failures.iter().map(|f| f.to_string()).collect();
        Err(Error::SelfTestError(format!(
            "{} of {} checks failed:\n  {}",
            self.failures.len(),
            self.checked,
            lines.join("\n  ")
        )))
    }
}

/// Evaluate every expectation against the rule set
pub fn run_self_test(rules: &RuleSet, expectations: &RuleExpectations) -> SelfTestReport {
    let mut report = SelfTestReport::default();

    for (arch, packages) in expectations {
        for (package, versions) in packages {
            for (version, expected) in versions {
                let actual = rules.passes(arch, package, version);
                report.checked += 1;
                if actual == *expected {
                    debug!("{} {}/{}: {} as expected", arch, package, version, outcome(actual));
                } else {
                    let failure = SelfTestFailure {
                        arch: arch.clone(),
                        package: package.clone(),
                        version: version.clone(),
                        expected: *expected,
                        actual,
                    };
                    error!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }
    }

    info!(
        "Rule self-test: {} checks, {} failures",
        report.checked,
        report.failures.len()
    );
    report
}
