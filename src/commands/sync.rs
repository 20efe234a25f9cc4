// src/commands/sync.rs
//! Synchronization command

use super::{load_config, open_store};
use anyhow::{Context, Result};
use pubsync::backend::{self, BackendContext};
use pubsync::{
    BackendKind, LogSink, NotificationSink, ShellExecutor, SyncOptions, SyncReport, Synchronizer,
    TemplateNotifier,
};
use std::path::Path;
use tracing::{error, info};

/// Publish new packages to `kind`; returns the process exit code
pub fn cmd_sync(kind: BackendKind, config_path: &Path, dry_run: bool, abort_at_start: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    config.validate_for(kind)?;
    if dry_run {
        info!("Dry run: nothing will be changed");
    }

    let store = open_store(&config)?;
    let ctx = BackendContext::new(Box::new(ShellExecutor::new()), config.connection.clone())
        .with_dry_run(dry_run);
    let mut backend = backend::create(kind, &config, ctx)
        .with_context(|| format!("Cannot set up the {kind} backend"))?;

    let notifier: Box<dyn NotificationSink> = if config.notification.rules.is_empty() {
        Box::new(LogSink)
    } else {
        Box::new(TemplateNotifier::from_config(&config.notification)?)
    };

    let options = SyncOptions { abort_at_start };
    let result = Synchronizer::new(&config, store.as_ref(), backend.as_mut(), notifier.as_ref(), options)
        .and_then(|sync| sync.with_dry_run(dry_run).run());

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(report.exit_code())
        }
        Err(e) => {
            error!("{}", e);
            Ok(e.exit_code())
        }
    }
}

fn print_report(report: &SyncReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Synchronization to {}{}", report.backend, mode);
    println!(
        "{:<24} {:<24} {:>10} {:>10} {:>10} {:>10}",
        "ARCH", "PUBLISHED AS", "CANDIDATES", "UP-TO-DATE", "INSTALLED", "FAILED"
    );
    for arch in &report.arches {
        println!(
            "{:<24} {:<24} {:>10} {:>10} {:>10} {:>10}",
            arch.arch,
            arch.target,
            arch.candidates,
            arch.up_to_date,
            arch.successes(),
            arch.failures()
        );
        for outcome in arch.outcomes.iter().filter(|o| !o.success) {
            println!("  failed: {}", outcome.package);
        }
    }
    let elapsed = report.finished - report.started;
    println!(
        "Publish {}, {} installed, {} failed in {}s",
        if report.published { "succeeded" } else { "FAILED" },
        report.successes(),
        report.failures(),
        elapsed.num_seconds()
    );
}
