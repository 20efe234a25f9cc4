// src/cli/mod.rs
//! CLI definitions for pubsync
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `sync` - Publish selected packages to one backend
//! - `test-rules` - Check the include/exclude rules against expectations
//! - `remove-orphans` - List or delete RPMs no marked package needs
//! - `completions` - Generate shell completions

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pubsync::{BackendKind, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pubsync")]
#[command(author = "pubsync Contributors")]
#[command(version)]
#[command(about = "Publish packages from an artifact store to software repositories", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Destination backend, as named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Plain directory tree
    Dir,
    /// CernVM-FS repository
    Cvmfs,
    /// Remote package manager
    Packman,
    /// RPM repository
    Rpm,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Dir => BackendKind::Dir,
            Backend::Cvmfs => BackendKind::Cvmfs,
            Backend::Packman => BackendKind::Packman,
            Backend::Rpm => BackendKind::Rpm,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish new packages from the store to a backend
    Sync {
        /// Destination backend
        #[arg(value_enum)]
        backend: Backend,

        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Log what would be done without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Abort a transaction left open by an earlier run first
        #[arg(long)]
        abort_at_start: bool,
    },

    /// Check rules against a table of expected results
    ///
    /// The table maps architecture, package and version to the expected
    /// outcome:
    ///
    ///     [slc7_x86-64.ROOT]
    ///     "v6-28-1" = true
    ///     "v5-34-30" = false
    TestRules {
        /// Expectation table (TOML)
        table: PathBuf,

        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// List RPMs that no marked package needs
    RemoveOrphans {
        /// Directory containing the RPMs
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Delete orphans instead of printing rm commands
        #[arg(long)]
        do_delete: bool,

        /// Keep RPMs whose file name contains this marker
        #[arg(long, default_value = pubsync::orphans::DEFAULT_MARKER)]
        marker: String,

        /// Architecture suffix of the RPM files
        #[arg(long, default_value = "x86_64")]
        rpm_arch: String,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
