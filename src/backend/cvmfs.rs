// src/backend/cvmfs.rs

//! Transactional versioned filesystem destination
//!
//! The repository must be opened with `cvmfs_server transaction` before
//! anything is written below its mount point, and nothing is visible to
//! clients until `cvmfs_server publish`. Only one transaction can be open
//! on a repository, so a run killed halfway leaves the repository locked;
//! `abort(force = true)` at startup releases it.

use super::filesystem::{install_path, install_tree};
use super::{BackendContext, BackendKind, InstallRequest, PublishBackend, TxnState, TxnTracker, workdir};
use crate::config::CvmfsConfig;
use crate::error::Result;
use crate::executor::ScriptTemplate;
use crate::package::PackageRef;
use crate::template::TemplateVars;
use tracing::{error, info};

pub struct CvmfsBackend {
    config: CvmfsConfig,
    ctx: BackendContext,
    txn: TxnTracker,
    begin: ScriptTemplate,
    commit: ScriptTemplate,
    rollback: ScriptTemplate,
}

impl CvmfsBackend {
    pub fn new(config: CvmfsConfig, ctx: BackendContext) -> Result<Self> {
        Ok(Self {
            begin: config.transaction_script()?,
            commit: config.publish_script()?,
            rollback: config.abort_script()?,
            config,
            ctx,
            txn: TxnTracker::new(),
        })
    }

    fn repo_vars(&self) -> TemplateVars {
        let mut vars = self.ctx.base_vars();
        vars.insert("repository", self.config.repository.clone());
        vars.insert("repodir", self.config.package_dir.display().to_string());
        vars
    }
}

impl PublishBackend for CvmfsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cvmfs
    }

    fn installed(&mut self, arch: &str, package: &PackageRef) -> Result<bool> {
        Ok(install_path(&self.config.package_dir, arch, package).is_dir())
    }

    fn install(&mut self, request: &InstallRequest<'_>) -> i32 {
        if !self.txn.is_open() {
            error!("Refusing to install {} outside a transaction", request.package);
            return -1;
        }
        let work = workdir(&self.config.workdir);
        install_tree(
            &self.ctx,
            &mut self.txn,
            &self.config.package_dir,
            &self.config.install,
            &work,
            &self.config.repository,
            request,
        )
    }

    fn transaction(&mut self) -> bool {
        if self.txn.is_open() {
            return true;
        }
        let status = self.ctx.run("cvmfs transaction", &self.begin, &self.repo_vars());
        if status != 0 {
            error!(
                "Cannot open a transaction on {} (status {}); is another one in progress?",
                self.config.repository, status
            );
            return false;
        }
        self.txn.begin();
        true
    }

    fn abort(&mut self, force: bool) -> bool {
        if !force && !self.txn.is_open() {
            info!("No transaction open on {}", self.config.repository);
            return true;
        }
        let status = self.ctx.run("cvmfs abort", &self.rollback, &self.repo_vars());
        // A forced abort on an idle repository fails harmlessly
        if status != 0 && !force {
            error!("Abort of {} failed with status {}", self.config.repository, status);
            return false;
        }
        self.txn.close(TxnState::Aborted);
        true
    }

    fn publish(&mut self) -> bool {
        if self.txn.changes() == 0 {
            info!("No changes on {}, aborting instead of publishing", self.config.repository);
            return self.abort(false);
        }
        let status = self.ctx.run("cvmfs publish", &self.commit, &self.repo_vars());
        if status != 0 {
            error!("Publishing {} failed with status {}", self.config.repository, status);
            self.abort(true);
            return false;
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

#[cfg(test)]
mod tests {
    use super::super::testing::{FakeExecutor, context};
    use super::*;
    use tempfile::TempDir;

    fn backend(tmp: &TempDir, fake: &FakeExecutor) -> CvmfsBackend {
        let config = CvmfsConfig {
            repository: "sw.example.org".to_string(),
            package_dir: tmp.path().to_path_buf(),
            install: ScriptTemplate::parse("install {{package}} {{repository}}").unwrap(),
            workdir: None,
            transaction: None,
            publish: None,
            abort: None,
        };
        CvmfsBackend::new(config, context(fake)).unwrap()
    }

    #[test]
    fn test_full_cycle() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeExecutor::default();
        let mut backend = backend(&tmp, &fake);
        let pkg = PackageRef::new("zlib", "v1-1");
        let request = InstallRequest {
            url: "u",
            arch: "el9",
            package: &pkg,
            direct_runtime: &[],
            runtime: &[],
        };

        assert!(backend.transaction());
        assert!(backend.transaction());
        assert_eq!(backend.install(&request), 0);
        assert!(backend.publish());
        assert_eq!(backend.state(), TxnState::Committed);

        let runs = fake.runs.borrow();
        let scripts: Vec<&str> = runs.iter().map(|(_, s)| s.as_str()).collect();
        assert_eq!(
            scripts,
            vec![
                "cvmfs_server transaction sw.example.org",
                "install zlib sw.example.org",
                "cvmfs_server publish sw.example.org",
            ]
        );
    }

    #[test]
    fn test_busy_repository_refuses_transaction() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeExecutor::default();
        fake.answer("cvmfs transaction", 1, "");
        let mut backend = backend(&tmp, &fake);
        assert!(!backend.transaction());
        assert_eq!(backend.state(), TxnState::Idle);
    }

    #[test]
    fn test_zero_change_publish_runs_abort_only() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeExecutor::default();
        let mut backend = backend(&tmp, &fake);
        assert!(backend.transaction());
        assert!(backend.publish());
        assert_eq!(backend.state(), TxnState::Aborted);
        assert_eq!(fake.labels(), vec!["cvmfs transaction", "cvmfs abort"]);
        assert!(backend.transaction());
    }

    #[test]
    fn test_forced_abort_is_safe_when_idle() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeExecutor::default();
        fake.answer("cvmfs abort", 1, "");
        let mut backend = backend(&tmp, &fake);
        assert!(backend.abort(true));
        assert!(backend.abort(true));
        assert!(backend.abort(false));
        assert_eq!(fake.labels(), vec!["cvmfs abort", "cvmfs abort"]);
    }

    #[test]
    fn test_publish_failure() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeExecutor::default();
        fake.answer("cvmfs publish", 1, "");
        let mut backend = backend(&tmp, &fake);
        let pkg = PackageRef::new("zlib", "v1-1");
        assert!(backend.transaction());
        backend.install(&InstallRequest {
            url: "u",
            arch: "el9",
            package: &pkg,
            direct_runtime: &[],
            runtime: &[],
        });
        assert!(!backend.publish());
        assert_eq!(backend.state(), TxnState::Aborted);
    }
}
