// src/sync.rs

//! Synchronization run
//!
//! One run walks every configured architecture in order:
//!
//! 1. select candidates from the store
//! 2. for each candidate, skip it if the backend already has it, resolve
//!    its dependencies and artifact location, open the backend
//!    transaction (once) and install it
//! 3. publish the backend transaction
//! 4. report every outcome to the notification sink, but only if the
//!    publish succeeded
//!
//! Candidate-level problems are recorded and the run goes on. A backend
//! that cannot open its transaction stops the run at once.

use crate::backend::{BackendKind, InstallRequest, PublishBackend, TxnState};
use crate::config::Config;
use crate::dependencies::DependencyResolver;
use crate::error::Error;
use crate::notify::{NotificationSink, PublishRecord};
use crate::package::PackageRef;
use crate::rules::RuleSet;
use crate::selector::{CandidateSelector, SelectionOptions};
use crate::store::{DirectoryLister, StoreSnapshot, arch_dir};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Fatal errors of a run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] Error),

    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Cannot open transaction: {0}")]
    TransactionOpen(String),
}

impl SyncError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Config(_) | SyncError::Backend(_) => 1,
            SyncError::TransactionOpen(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Force-abort a transaction left behind by an earlier run first
    pub abort_at_start: bool,
}

/// Outcome of one install attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeEntry {
    pub package: PackageRef,
    pub success: bool,
    /// Direct runtime dependencies, for successful installs
    pub deps: Vec<PackageRef>,
    /// Runtime dependencies, for successful installs
    pub all_deps: Vec<PackageRef>,
}

impl OutcomeEntry {
    fn failed(package: PackageRef) -> Self {
        Self {
            package,
            success: false,
            deps: Vec::new(),
            all_deps: Vec::new(),
        }
    }
}

/// Outcomes of one architecture
#[derive(Debug, Clone)]
pub struct ArchReport {
    /// Store architecture
    pub arch: String,
    /// Architecture name at the destination
    pub target: String,
    pub candidates: usize,
    /// Candidates the backend already had
    pub up_to_date: usize,
    pub outcomes: Vec<OutcomeEntry>,
}

impl ArchReport {
    fn new(arch: &str, target: &str) -> Self {
        Self {
            arch: arch.to_string(),
            target: target.to_string(),
            candidates: 0,
            up_to_date: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub backend: BackendKind,
    pub dry_run: bool,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub arches: Vec<ArchReport>,
    pub published: bool,
}

impl SyncReport {
    pub fn successes(&self) -> usize {
        self.arches.iter().map(ArchReport::successes).sum()
    }

    pub fn failures(&self) -> usize {
        self.arches.iter().map(ArchReport::failures).sum()
    }

    /// Published, and either nothing failed or something succeeded
    pub fn is_ok(&self) -> bool {
        self.published && (self.failures() == 0 || self.successes() > 0)
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_ok() { 0 } else { 1 }
    }
}

/// Drives one run against one backend
pub struct Synchronizer<'a> {
    config: &'a Config,
    rules: RuleSet,
    lister: &'a dyn DirectoryLister,
    backend: &'a mut dyn PublishBackend,
    notifier: &'a dyn NotificationSink,
    options: SyncOptions,
    dry_run: bool,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        config: &'a Config,
        lister: &'a dyn DirectoryLister,
        backend: &'a mut dyn PublishBackend,
        notifier: &'a dyn NotificationSink,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            rules: config.rules()?,
            config,
            lister,
            backend,
            notifier,
            options,
            dry_run: false,
        })
    }

    /// Only mark the report as a dry run; the backend decides what it skips
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(mut self) -> Result<SyncReport, SyncError> {
        let kind = self.backend.kind();
        let started = Utc::now();
        info!("Starting {} synchronization", kind);

        if self.options.abort_at_start {
            info!("Aborting any stale transaction");
            if !self.backend.abort(true) {
                return Err(SyncError::Backend(format!("{kind}: cannot abort stale transaction")));
            }
        }

        let config = self.config;
        let mut arches = Vec::new();
        for arch in config.architectures.keys() {
            let Some(target) = config.target_arch(arch, kind) else {
                warn!("{} is not published to {}, skipping", arch, kind);
                continue;
            };
            arches.push(self.sync_arch(arch, target)?);
        }

        let published = self.backend.publish();
        if published {
            info!("{} publish done ({})", kind, self.backend.state());
            for report in &arches {
                for outcome in &report.outcomes {
                    self.notifier.notify(&PublishRecord {
                        package: outcome.package.clone(),
                        arch: report.arch.clone(),
                        success: outcome.success,
                        deps: outcome.deps.clone(),
                        all_deps: outcome.all_deps.clone(),
                    });
                }
            }
        } else {
            error!("{} publish failed, no notifications sent", kind);
        }

        Ok(SyncReport {
            backend: kind,
            dry_run: self.dry_run,
            started,
            finished: Utc::now(),
            arches,
            published,
        })
    }

    fn sync_arch(&mut self, arch: &str, target: &str) -> Result<ArchReport, SyncError> {
        info!("Synchronizing {} as {}", arch, target);
        let snapshot = self
            .config
            .store
            .snapshot
            .then(|| StoreSnapshot::capture(self.lister, &arch_dir(arch)));
        let lister: &dyn DirectoryLister = match &snapshot {
            Some(snapshot) => snapshot,
            None => self.lister,
        };

        let options = SelectionOptions {
            auto_include_deps: self.config.auto_include_deps,
        };
        let selection = CandidateSelector::new(lister, &self.rules, options).select(arch);
        let resolver = DependencyResolver::new(lister, &selection.known);

        let mut report = ArchReport::new(arch, target);
        report.candidates = selection.candidates.len();

        for package in selection.candidates {
            let installed = match self.backend.installed(target, &package) {
                Ok(installed) => installed,
                Err(e) => {
                    if self.backend.state() == TxnState::Open && !self.backend.abort(false) {
                        error!("{}: cannot abort the open transaction", self.backend.kind());
                    }
                    return Err(SyncError::Backend(e.to_string()));
                }
            };
            if installed {
                debug!("{} already installed for {}", package, target);
                report.up_to_date += 1;
                continue;
            }

            let resolved = match resolver.resolve(arch, &package) {
                Ok(resolved) => resolved,
                Err(e) => {
                    error!("{}: {}, skipping", package, e);
                    report.outcomes.push(OutcomeEntry::failed(package));
                    continue;
                }
            };

            if !self.backend.transaction() {
                return Err(SyncError::TransactionOpen(format!(
                    "{} refused to open a transaction",
                    self.backend.kind()
                )));
            }

            let status = self.backend.install(&InstallRequest {
                url: &resolved.url,
                arch: target,
                package: &resolved.package,
                direct_runtime: &resolved.deps.direct_runtime,
                runtime: &resolved.deps.runtime,
            });
            if status == 0 {
                report.outcomes.push(OutcomeEntry {
                    package,
                    success: true,
                    deps: resolved.deps.direct_runtime,
                    all_deps: resolved.deps.runtime,
                });
            } else {
                error!("Installing {} for {} failed with status {}", package, target, status);
                report.outcomes.push(OutcomeEntry::failed(package));
            }
        }

        info!(
            "{}: {} candidates, {} up to date, {} installed, {} failed",
            arch,
            report.candidates,
            report.up_to_date,
            report.successes(),
            report.failures()
        );
        Ok(report)
    }
}
