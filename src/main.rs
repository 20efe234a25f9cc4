// src/main.rs

use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Sync {
            backend,
            config,
            dry_run,
            abort_at_start,
        } => commands::cmd_sync(backend.into(), &config, dry_run, abort_at_start),
        Commands::TestRules { table, config } => {
            commands::cmd_test_rules(&table, &config).map(|()| 0)
        }
        Commands::RemoveOrphans {
            dir,
            do_delete,
            marker,
            rpm_arch,
        } => commands::cmd_remove_orphans(&dir, do_delete, &marker, &rpm_arch).map(|()| 0),
        Commands::Completions { shell } => commands::cmd_completions(shell).map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
