// src/backend/packman.rs

//! Remote package manager destination
//!
//! The package manager is a remote service: installs are registered one by
//! one and there is nothing to commit. Asking it whether a package exists
//! is expensive, so the whole catalogue of an architecture is fetched once
//! with the `list` script and kept for the rest of the run. Catalogue
//! entries look like `VO_ALICE@ROOT::v6-28-1` and may be separated by
//! whitespace or commas.

use super::{BackendContext, BackendKind, InstallRequest, PublishBackend, TxnState, TxnTracker, workdir};
use crate::config::PackmanConfig;
use crate::error::{Error, Result};
use crate::package::PackageRef;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Parse catalogue output, keeping the entries of `vo`
pub fn parse_catalogue(output: &str, vo: &str) -> HashSet<PackageRef> {
    output
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|token| {
            let (entry_vo, rest) = token.split_once('@')?;
            if entry_vo != vo {
                return None;
            }
            let (name, version) = rest.split_once("::")?;
            if name.is_empty() || version.is_empty() {
                return None;
            }
            Some(PackageRef::new(name, version))
        })
        .collect()
}

pub struct PackmanBackend {
    config: PackmanConfig,
    ctx: BackendContext,
    txn: TxnTracker,
    catalogue: HashMap<String, HashSet<PackageRef>>,
}

impl PackmanBackend {
    pub fn new(config: PackmanConfig, ctx: BackendContext) -> Self {
        Self {
            config,
            ctx,
            txn: TxnTracker::new(),
            catalogue: HashMap::new(),
        }
    }

    /// `<vo>@<name>::<version>` list separated by commas
    pub fn format_deps(&self, deps: &[PackageRef]) -> String {
        deps.iter()
            .map(|d| format!("{}@{}::{}", self.config.vo, d.name, d.version))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn catalogue(&mut self, arch: &str) -> Result<&HashSet<PackageRef>> {
        if !self.catalogue.contains_key(arch) {
            let mut vars = self.ctx.base_vars();
            vars.insert("arch", arch.to_string());
            let label = format!("packman list {arch}");
            // Listing is read-only, so it runs in dry-run mode too
            let output = self.ctx.exec(&label, &self.config.list, &vars);
            if !output.success() {
                return Err(Error::BackendError(format!(
                    "Cannot list packages for {arch}: status {}",
                    output.status
                )));
            }
            let entries = parse_catalogue(&output.stdout, &self.config.vo);
            info!("{} packages registered for {}", entries.len(), arch);
            self.catalogue.insert(arch.to_string(), entries);
        }
        self.catalogue
            .get(arch)
            .ok_or_else(|| Error::BackendError(format!("No catalogue for {arch}")))
    }
}

impl PublishBackend for PackmanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Packman
    }

    fn installed(&mut self, arch: &str, package: &PackageRef) -> Result<bool> {
        Ok(self.catalogue(arch)?.contains(package))
    }

    fn install(&mut self, request: &InstallRequest<'_>) -> i32 {
        let mut vars = self.ctx.install_vars(
            request,
            self.format_deps(request.direct_runtime),
            self.format_deps(request.runtime),
        );
        vars.insert("workdir", workdir(&self.config.workdir).display().to_string());

        let label = format!("install {}@{}", request.package, request.arch);
        let status = self.ctx.run(&label, &self.config.install, &vars);
        if status == 0 {
            self.txn.record_change();
            if let Some(entries) = self.catalogue.get_mut(request.arch) {
                entries.insert(request.package.clone());
            }
        } else {
            warn!("Registration of {} for {} failed ({})", request.package, request.arch, status);
        }
        status
    }

    fn transaction(&mut self) -> bool {
        if self.txn.is_open() {
            return true;
        }
        if let Some(health) = &self.config.health {
            let output = self.ctx.exec("packman health", health, &self.ctx.base_vars());
            if !output.success() {
                error!("Package manager is not reachable (status {})", output.status);
                return false;
            }
            debug!("Package manager is healthy");
        }
        self.txn.begin();
        true
    }

    fn abort(&mut self, force: bool) -> bool {
        if self.txn.is_open() || force {
            if self.txn.changes() > 0 {
                warn!("{} registrations already done cannot be rolled back", self.txn.changes());
            }
            self.txn.close(TxnState::Aborted);
        }
        true
    }

    fn publish(&mut self) -> bool {
        if self.txn.changes() == 0 {
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
