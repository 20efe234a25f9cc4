// src/commands/orphans.rs
//! Orphan RPM removal command

use anyhow::{Context, Result};
use pubsync::orphans::{OrphanFinder, RpmQuery, shell_quote};
use std::fs;
use std::path::Path;
use tracing::info;

/// Print `rm` commands for orphan RPMs in `dir`, or delete them
pub fn cmd_remove_orphans(dir: &Path, do_delete: bool, marker: &str, rpm_arch: &str) -> Result<()> {
    let orphans = OrphanFinder::new(dir, RpmQuery)
        .with_marker(marker)
        .with_rpm_arch(rpm_arch)
        .orphans()
        .with_context(|| format!("Cannot compute orphans in {}", dir.display()))?;

    info!("{} orphan RPMs in {}", orphans.len(), dir.display());
    for rpm in &orphans {
        if do_delete {
            fs::remove_file(rpm).with_context(|| format!("Failed to delete {}", rpm.display()))?;
            info!("Deleted RPM {}", rpm.display());
        } else {
            println!("rm {}", shell_quote(&rpm.display().to_string()));
        }
    }
    Ok(())
}
