// src/backend/rpm.rs

//! RPM repository destination
//!
//! Packages are built as RPMs into a private staging directory while the
//! transaction is open. Publishing moves the staged RPMs into the live
//! repository and regenerates the metadata of every touched architecture
//! with `createrepo`. Aborting simply drops the staging directory.
//!
//! The staging directory is named `pubsync-rpm-*` under the staging root;
//! a forced abort also removes such directories left behind by killed runs.

use super::{BackendContext, BackendKind, InstallRequest, PublishBackend, TxnState, TxnTracker, cleanup, workdir};
use crate::config::RpmConfig;
use crate::error::{Error, Result};
use crate::executor::ScriptTemplate;
use crate::package::PackageRef;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Prefix of staging directories
const STAGING_PREFIX: &str = "pubsync-rpm-";

/// Move a file, falling back to copy + fsync + delete across filesystems
pub(crate) fn move_file_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!("Cross-filesystem move {} -> {}, copying", src.display(), dst.display());
            fs::copy(src, dst)?;
            File::open(dst)?.sync_all()?;
            if let Some(parent) = dst.parent()
                && let Ok(dir) = File::open(parent)
            {
                let _ = dir.sync_all();
            }
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

pub struct RpmBackend {
    config: RpmConfig,
    ctx: BackendContext,
    txn: TxnTracker,
    createrepo: ScriptTemplate,
    staging: Option<TempDir>,
    touched: BTreeSet<String>,
}

impl RpmBackend {
    pub fn new(config: RpmConfig, ctx: BackendContext) -> Result<Self> {
        Ok(Self {
            createrepo: config.createrepo_script()?,
            config,
            ctx,
            txn: TxnTracker::new(),
            staging: None,
            touched: BTreeSet::new(),
        })
    }

    /// `<prefix><name>+<version>-1-1.<rpm_arch>.rpm`
    pub fn rpm_file_name(&self, package: &PackageRef) -> String {
        format!(
            "{}{}+{}-1-1.{}.rpm",
            self.config.prefix, package.name, package.version, self.config.rpm_arch
        )
    }

    /// `<prefix><name>+<version>` list separated by spaces
    pub fn format_deps(&self, deps: &[PackageRef]) -> String {
        deps.iter()
            .map(|d| format!("{}{}+{}", self.config.prefix, d.name, d.version))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn staging_root(&self) -> PathBuf {
        self.config.staging_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn repo_dir(&self, arch: &str) -> PathBuf {
        self.config.repo_dir.join(arch)
    }

    fn stage_dir(&self, arch: &str) -> Option<PathBuf> {
        self.staging.as_ref().map(|s| s.path().join(arch))
    }

    /// Remove staging directories of earlier runs
    fn remove_stale_staging(&self) {
        let pattern = format!("{}/{}*", self.staging_root().display(), STAGING_PREFIX);
        let current = self.staging.as_ref().map(|s| s.path().to_path_buf());
        let Ok(paths) = glob::glob(&pattern) else {
            warn!("Invalid staging pattern {}", pattern);
            return;
        };
        for path in paths.filter_map(|p| p.ok()) {
            if Some(&path) == current.as_ref() {
                continue;
            }
            info!("Removing stale staging directory {}", path.display());
            cleanup(&path);
        }
    }

    /// Move every staged RPM of `arch` into the repository
    fn promote(&self, arch: &str) -> Result<usize> {
        let Some(stage) = self.stage_dir(arch) else {
            return Ok(0);
        };
        let repo = self.repo_dir(arch);
        fs::create_dir_all(&repo)?;

        let mut moved = 0;
        for entry in fs::read_dir(&stage)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "rpm") {
                continue;
            }
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let dest = repo.join(file_name);
            move_file_atomic(&path, &dest).map_err(|e| {
                Error::BackendError(format!("Cannot move {} to {}: {e}", path.display(), dest.display()))
            })?;
            moved += 1;
        }
        Ok(moved)
    }

    fn finish(&mut self, state: TxnState) {
        self.staging = None;
        self.touched.clear();
        self.txn.close(state);
    }
}

impl PublishBackend for RpmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rpm
    }

    fn installed(&mut self, arch: &str, package: &PackageRef) -> Result<bool> {
        let name = self.rpm_file_name(package);
        let staged = self.stage_dir(arch).is_some_and(|s| s.join(&name).exists());
        Ok(staged || self.repo_dir(arch).join(&name).exists())
    }

    fn install(&mut self, request: &InstallRequest<'_>) -> i32 {
        let label = format!("install {}@{}", request.package, request.arch);
        let rpm_name = self.rpm_file_name(request.package);

        let mut vars = self.ctx.install_vars(
            request,
            self.format_deps(request.direct_runtime),
            self.format_deps(request.runtime),
        );
        vars.insert("repodir", self.repo_dir(request.arch).display().to_string());
        vars.insert("workdir", workdir(&self.config.workdir).display().to_string());

        if self.ctx.dry_run() {
            info!("[dry-run] Would build {}", rpm_name);
            vars.insert("stagedir", String::new());
            self.txn.record_change();
            return self.ctx.run(&label, &self.config.install, &vars);
        }

        let Some(stage) = self.stage_dir(request.arch) else {
            error!("Refusing to build {} outside a transaction", rpm_name);
            return -1;
        };
        if let Err(e) = fs::create_dir_all(&stage) {
            error!("Cannot create {}: {}", stage.display(), e);
            return -1;
        }
        vars.insert("stagedir", stage.display().to_string());

        let rpm = stage.join(&rpm_name);
        let mut status = self.ctx.run(&label, &self.config.install, &vars);
        if status == 0 && !rpm.exists() {
            error!("{} reported success but {} was not produced", label, rpm_name);
            status = 1;
        }
        if status == 0 {
            self.txn.record_change();
            self.touched.insert(request.arch.to_string());
            info!("Staged {}", rpm_name);
        } else {
            warn!("Build of {} failed ({}), cleaning up", rpm_name, status);
            cleanup(&rpm);
        }
        status
    }

    fn transaction(&mut self) -> bool {
        if self.txn.is_open() {
            return true;
        }
        if self.ctx.dry_run() {
            self.txn.begin();
            return true;
        }
        if !self.config.repo_dir.is_dir() {
            error!("Repository directory {} does not exist", self.config.repo_dir.display());
            return false;
        }
        let root = self.staging_root();
        match tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(&root) {
            Ok(dir) => {
                debug!("Staging RPMs in {}", dir.path().display());
                self.staging = Some(dir);
                self.txn.begin();
                true
            }
            Err(e) => {
                error!("Cannot create staging directory in {}: {}", root.display(), e);
                false
            }
        }
    }

    fn abort(&mut self, force: bool) -> bool {
        if force && !self.ctx.dry_run() {
            self.remove_stale_staging();
        }
        if self.txn.is_open() || force {
            self.finish(TxnState::Aborted);
        }
        true
    }

    fn publish(&mut self) -> bool {
        if self.txn.changes() == 0 {
            info!("No RPMs staged, aborting instead of publishing");
            return self.abort(false);
        }
        if self.ctx.dry_run() {
            info!("[dry-run] Would publish {} RPMs", self.txn.changes());
            self.finish(TxnState::Committed);
            return true;
        }

        let mut ok = true;
        for arch in &self.touched {
            match self.promote(arch) {
                Ok(moved) => info!("Moved {} RPMs into {}", moved, self.repo_dir(arch).display()),
                Err(e) => {
                    error!("{}", e);
                    ok = false;
                    continue;
                }
            }
            let mut vars = self.ctx.base_vars();
            vars.insert("arch", arch.clone());
            vars.insert("repodir", self.repo_dir(arch).display().to_string());
            let status = self.ctx.run(&format!("createrepo {arch}"), &self.createrepo, &vars);
            if status != 0 {
                error!("Regenerating metadata of {} failed with status {}", arch, status);
                ok = false;
            }
        }

        self.finish(if ok { TxnState::Committed } else { TxnState::Aborted });
        ok
    }

    fn state(&self) -> TxnState {
        self.txn.state()
    }

    fn changes(&self) -> usize {
        self.txn.changes()
    }
}
