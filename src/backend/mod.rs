// src/backend/mod.rs

//! Publish destinations
//!
//! A backend receives packages selected from the store and makes them
//! available at its destination. Four variants exist, chosen once at
//! startup:
//!
//! - [`FilesystemBackend`] (`dir`): a plain directory tree
//! - [`CvmfsBackend`] (`cvmfs`): a transactional versioned filesystem
//! - [`PackmanBackend`] (`packman`): a remote package manager
//! - [`RpmBackend`] (`rpm`): a yum repository rebuilt with createrepo
//!
//! Every backend goes through one transaction per run:
//!
//! ```text
//! Idle --transaction()--> Open --publish()--> Committed
//!                          |  \--publish() with no changes--> Aborted
//!                          \--abort()--> Aborted
//! ```
//!
//! Install failures never close the transaction; the backend removes the
//! partial output of that one package and stays open for the next one.
//! In dry-run mode every mutating operation logs what it would do and
//! reports success.

mod cvmfs;
mod filesystem;
mod packman;
mod rpm;

pub use cvmfs::CvmfsBackend;
pub use filesystem::FilesystemBackend;
pub use packman::PackmanBackend;
pub use rpm::RpmBackend;

use crate::config::{Config, ConnectionSettings};
use crate::error::{Error, Result};
use crate::executor::{ExecOutput, InstallExecutor, ScriptTemplate};
use crate::package::PackageRef;
use crate::template::TemplateVars;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Backend variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Dir,
    Cvmfs,
    Packman,
    Rpm,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Dir,
        BackendKind::Cvmfs,
        BackendKind::Packman,
        BackendKind::Rpm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Dir => "dir",
            BackendKind::Cvmfs => "cvmfs",
            BackendKind::Packman => "packman",
            BackendKind::Rpm => "rpm",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dir" => Ok(BackendKind::Dir),
            "cvmfs" => Ok(BackendKind::Cvmfs),
            "packman" => Ok(BackendKind::Packman),
            "rpm" => Ok(BackendKind::Rpm),
            _ => Err(format!(
                "Unknown backend '{s}' (expected dir, cvmfs, packman or rpm)"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction state of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Open,
    Committed,
    Aborted,
}

impl TxnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnState::Idle => "idle",
            TxnState::Open => "open",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State and change counter shared by every backend
#[derive(Debug, Clone)]
pub struct TxnTracker {
    id: Option<Uuid>,
    state: TxnState,
    changes: usize,
}

impl Default for TxnTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TxnTracker {
    pub fn new() -> Self {
        Self {
            id: None,
            state: TxnState::Idle,
            changes: 0,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    pub fn is_open(&self) -> bool {
        self.state == TxnState::Open
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Enter `Open` with a fresh id and a zero change counter
    pub fn begin(&mut self) {
        let id = Uuid::new_v4();
        info!("Transaction {} opened", id);
        self.id = Some(id);
        self.state = TxnState::Open;
        self.changes = 0;
    }

    pub fn record_change(&mut self) {
        self.changes += 1;
    }

    /// Leave `Open`; the change counter starts over
    pub fn close(&mut self, state: TxnState) {
        if let Some(id) = self.id {
            info!("Transaction {} {} ({} changes)", id, state, self.changes);
        }
        self.state = state;
        self.changes = 0;
    }
}

/// One package to install
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    /// Download location of the artifact
    pub url: &'a str,
    /// Destination architecture name
    pub arch: &'a str,
    pub package: &'a PackageRef,
    /// Immediate dependencies needed at runtime
    pub direct_runtime: &'a [PackageRef],
    /// Every dependency needed at runtime
    pub runtime: &'a [PackageRef],
}

/// A publish destination
pub trait PublishBackend {
    fn kind(&self) -> BackendKind;

    /// Is `package` already available for `arch`? Never mutates the
    /// destination.
    fn installed(&mut self, arch: &str, package: &PackageRef) -> Result<bool>;

    /// Install one package; returns the exit status of the install
    /// procedure (0 on success)
    fn install(&mut self, request: &InstallRequest<'_>) -> i32;

    /// Open the run's transaction; idempotent. False means the
    /// destination is unusable and the run must stop.
    fn transaction(&mut self) -> bool;

    /// Roll back the open transaction. With `force`, also clean up a
    /// transaction left behind by an earlier run, even if none is open.
    fn abort(&mut self, force: bool) -> bool;

    /// Commit the open transaction; a transaction without changes is
    /// aborted instead
    fn publish(&mut self) -> bool;

    fn state(&self) -> TxnState;

    fn changes(&self) -> usize;
}

/// Everything backends share: the executor, dry-run mode and connection
/// parameters passed to scripts
pub struct BackendContext {
    executor: Box<dyn InstallExecutor>,
    dry_run: bool,
    connection: ConnectionSettings,
}

impl BackendContext {
    pub fn new(executor: Box<dyn InstallExecutor>, connection: ConnectionSettings) -> Self {
        Self {
            executor,
            dry_run: false,
            connection,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Variables every script receives
    pub fn base_vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("ssl_verify", self.connection.ssl_verify.to_string());
        vars.insert("timeout", self.connection.timeout.to_string());
        vars.insert("retries", self.connection.retries.to_string());
        vars
    }

    /// Variables of an install script
    pub fn install_vars(&self, request: &InstallRequest<'_>, deps: String, all_deps: String) -> TemplateVars {
        let mut vars = self.base_vars();
        vars.insert("url", request.url.to_string());
        vars.insert("package", request.package.name.clone());
        vars.insert("version", request.package.version.clone());
        vars.insert("arch", request.arch.to_string());
        vars.insert("deps", deps);
        vars.insert("all_deps", all_deps);
        vars
    }

    /// Run a script and return its output, folding a start failure into
    /// status -1
    pub fn exec(&self, label: &str, script: &ScriptTemplate, vars: &TemplateVars) -> ExecOutput {
        match self.executor.run(label, script, vars) {
            Ok(output) => output,
            Err(e) => {
                error!("[{}] {}", label, e);
                ExecOutput {
                    status: -1,
                    ..ExecOutput::default()
                }
            }
        }
    }

    /// Run a mutating script; in dry-run mode only log it
    pub fn run(&self, label: &str, script: &ScriptTemplate, vars: &TemplateVars) -> i32 {
        if self.dry_run {
            info!("[dry-run] {}: {}", label, script.render(vars));
            return 0;
        }
        self.exec(label, script, vars).status
    }
}

/// Scratch directory handed to scripts as `{{workdir}}`
pub(crate) fn workdir(configured: &Option<PathBuf>) -> PathBuf {
    configured.clone().unwrap_or_else(std::env::temp_dir)
}

/// Remove a partially installed path
pub(crate) fn cleanup(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        return;
    };
    match result {
        Ok(()) => debug!("Removed partial install {}", path.display()),
        Err(e) => error!("Cannot clean up {}: {}", path.display(), e),
    }
}

/// Instantiate the backend selected on the command line
pub fn create(kind: BackendKind, config: &Config, ctx: BackendContext) -> Result<Box<dyn PublishBackend>> {
    config.backends.require(kind)?;
    let missing = || Error::ConfigError(format!("Missing [backends.{kind}] section"));
    Ok(match kind {
        BackendKind::Dir => {
            let cfg = config.backends.dir.clone().ok_or_else(missing)?;
            Box::new(FilesystemBackend::new(cfg, ctx))
        }
        BackendKind::Cvmfs => {
            let cfg = config.backends.cvmfs.clone().ok_or_else(missing)?;
            Box::new(CvmfsBackend::new(cfg, ctx)?)
        }
        BackendKind::Packman => {
            let cfg = config.backends.packman.clone().ok_or_else(missing)?;
            Box::new(PackmanBackend::new(cfg, ctx))
        }
        BackendKind::Rpm => {
            let cfg = config.backends.rpm.clone().ok_or_else(missing)?;
            Box::new(RpmBackend::new(cfg, ctx)?)
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Executor double shared by the backend tests

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every rendered script and answers with scripted statuses
    #[derive(Clone, Default)]
    pub struct FakeExecutor {
        pub runs: Rc<RefCell<Vec<(String, String)>>>,
        /// (label prefix, status, stdout) consulted in order
        pub answers: Rc<RefCell<Vec<(String, i32, String)>>>,
        /// Files created when a script with the label prefix runs
        pub creates: Rc<RefCell<Vec<(String, PathBuf)>>>,
    }

    impl FakeExecutor {
        pub fn answer(&self, label_prefix: &str, status: i32, stdout: &str) {
            self.answers
                .borrow_mut()
                .push((label_prefix.to_string(), status, stdout.to_string()));
        }

        pub fn create_on(&self, label_prefix: &str, path: PathBuf) {
            self.creates.borrow_mut().push((label_prefix.to_string(), path));
        }

        pub fn labels(&self) -> Vec<String> {
            self.runs.borrow().iter().map(|(l, _)| l.clone()).collect()
        }
    }

    impl InstallExecutor for FakeExecutor {
        fn run(&self, label: &str, script: &ScriptTemplate, vars: &TemplateVars) -> Result<ExecOutput> {
            self.runs
                .borrow_mut()
                .push((label.to_string(), script.render(vars)));
            for (prefix, path) in self.creates.borrow().iter() {
                if label.starts_with(prefix.as_str()) {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, b"x")?;
                }
            }
            let answer = self
                .answers
                .borrow()
                .iter()
                .find(|(prefix, _, _)| label.starts_with(prefix.as_str()))
                .map(|(_, status, stdout)| (*status, stdout.clone()));
            let (status, stdout) = answer.unwrap_or((0, String::new()));
            Ok(ExecOutput {
                status,
                stdout,
                stderr: String::new(),
            })
        }
    }

    pub fn context(executor: &FakeExecutor) -> BackendContext {
        BackendContext::new(Box::new(executor.clone()), ConnectionSettings::default())
    }
}
