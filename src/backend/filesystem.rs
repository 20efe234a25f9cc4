// src/backend/filesystem.rs

//! Plain directory tree destination
//!
//! Packages land in `<package_dir>/<arch>/Packages/<name>/<version>`. There
//! is no durable commit step: each install is visible as soon as its script
//! finishes, and a failed install removes its version directory.

use super::{
    BackendContext, BackendKind, InstallRequest, PublishBackend, TxnState, TxnTracker, cleanup,
    workdir,
};
use crate::config::FilesystemConfig;
use crate::error::Result;
use crate::executor::ScriptTemplate;
use crate::package::PackageRef;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// `<root>/<arch>/Packages/<name>/<version>`
pub fn install_path(root: &Path, arch: &str, package: &PackageRef) -> PathBuf {
    root.join(arch)
        .join("Packages")
        .join(&package.name)
        .join(&package.version)
}

/// `<name>/<version>` list separated by spaces
pub fn tree_deps(deps: &[PackageRef]) -> String {
    deps.iter()
        .map(|d| format!("{}/{}", d.name, d.version))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run an install script into its own version directory, removing the
/// directory again if the script fails
pub(super) fn install_tree(
    ctx: &BackendContext,
    txn: &mut TxnTracker,
    root: &Path,
    install: &ScriptTemplate,
    work: &Path,
    repository: &str,
    request: &InstallRequest<'_>,
) -> i32 {
    let target = install_path(root, request.arch, request.package);
    let label = format!("install {}@{}", request.package, request.arch);

    let mut vars = ctx.install_vars(
        request,
        tree_deps(request.direct_runtime),
        tree_deps(request.runtime),
    );
    vars.insert("stagedir", target.display().to_string());
    vars.insert("repodir", root.display().to_string());
    vars.insert("workdir", work.display().to_string());
    vars.insert("repository", repository.to_string());

    if ctx.dry_run() {
        info!("[dry-run] Would install {} into {}", request.package, target.display());
        txn.record_change();
        return ctx.run(&label, install, &vars);
    }

    if let Err(e) = fs::create_dir_all(&target) {
        error!("Cannot create {}: {}", target.display(), e);
        return -1;
    }

    let status = ctx.run(&label, install, &vars);
    if status == 0 {
        txn.record_change();
        info!("Installed {} for {}", request.package, request.arch);
    } else {
        warn!("Install of {} for {} failed ({}), cleaning up", request.package, request.arch, status);
        cleanup(&target);
    }
    status
}

/// Publishes into a local directory
pub struct FilesystemBackend {
    config: FilesystemConfig,
    ctx: BackendContext,
    txn: TxnTracker,
}

impl FilesystemBackend {
    pub fn new(config: FilesystemConfig, ctx: BackendContext) -> Self {
        Self {
            config,
            ctx,
            txn: TxnTracker::new(),
        }
    }
}

impl PublishBackend for FilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dir
    }

    fn installed(&mut self, arch: &str, package: &PackageRef) -> Result<bool> {
        Ok(install_path(&self.config.package_dir, arch, package).is_dir())
    }

    fn install(&mut self, request: &InstallRequest<'_>) -> i32 {
        let work = workdir(&self.config.workdir);
        install_tree(
            &self.ctx,
            &mut self.txn,
            &self.config.package_dir,
            &self.config.install,
            &work,
            "",
            request,
        )
    }

    fn transaction(&mut self) -> bool {
        if self.txn.is_open() {
            return true;
        }
        if !self.ctx.dry_run() && !self.config.package_dir.is_dir() {
            error!("Package directory {} does not exist", self.config.package_dir.display());
            return false;
        }
        self.txn.begin();
        true
    }

    fn abort(&mut self, force: bool) -> bool {
        if self.txn.is_open() || force {
            self.txn.close(TxnState::Aborted);
        }
        true
    }

    fn publish(&mut self) -> bool {
        if self.txn.changes() == 0 {
            info!("Nothing to publish");
            return self.abort(false);
        }
        self.txn.close(TxnState::Committed);
        true
    }

    fn state(&self) -> TxnState {
        self.txn.state()
    }

    fn changes(&self) -> usize {
        self.txn.changes()
    }
}
