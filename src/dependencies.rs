// src/dependencies.rs

//! Dependency resolution for selected candidates
//!
//! Each package in the store carries three dependency listings (full
//! closure, direct, runtime). Every listing contains the package itself;
//! a listing that is empty or missing means the package is not fully
//! uploaded yet, and the candidate must not be installed in this run.

use crate::error::{Error, Result};
use crate::package::{KnownPackages, PackageRef};
use crate::store::{DirectoryLister, DistKind, dist_dir, pointer_path, resolve_pointer};
use tracing::debug;

/// The dependency sets of one package, self excluded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    pub full: Vec<PackageRef>,
    pub direct: Vec<PackageRef>,
    pub runtime: Vec<PackageRef>,
    /// Members of `direct` whose name also appears in `runtime`
    pub direct_runtime: Vec<PackageRef>,
}

impl DependencySet {
    /// Build from already filtered listings
    pub fn from_listings(
        package: &PackageRef,
        full: Vec<PackageRef>,
        direct: Vec<PackageRef>,
        runtime: Vec<PackageRef>,
    ) -> Self {
        let strip = |list: Vec<PackageRef>| -> Vec<PackageRef> {
            list.into_iter().filter(|p| p != package).collect()
        };
        let full = strip(full);
        let direct = strip(direct);
        let runtime = strip(runtime);
        let direct_runtime = direct
            .iter()
            .filter(|d| runtime.iter().any(|r| r.name == d.name))
            .cloned()
            .collect();
        Self {
            full,
            direct,
            runtime,
            direct_runtime,
        }
    }
}

/// A candidate ready to be installed
#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    pub package: PackageRef,
    pub deps: DependencySet,
    /// Download location of the artifact
    pub url: String,
}

/// Fetches dependency listings and artifact locations
pub struct DependencyResolver<'a> {
    lister: &'a dyn DirectoryLister,
    known: &'a KnownPackages,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(lister: &'a dyn DirectoryLister, known: &'a KnownPackages) -> Self {
        Self { lister, known }
    }

    /// One listing, restricted to recognized packages
    fn listing(&self, arch: &str, kind: DistKind, package: &PackageRef) -> Result<Vec<PackageRef>> {
        let path = dist_dir(arch, kind, package);
        let entries = self.lister.list(&path);
        if entries.is_empty() {
            return Err(Error::NotFoundError(format!(
                "{} listing of {} is empty or missing",
                kind.dir_name(),
                package
            )));
        }
        Ok(entries
            .iter()
            .filter(|e| !e.is_dir())
            .filter_map(|e| self.known.parse_tarball(&e.name, arch))
            .collect())
    }

    /// Fetch the three listings of `package`; a single attempt each
    pub fn dependencies(&self, arch: &str, package: &PackageRef) -> Result<DependencySet> {
        let full = self.listing(arch, DistKind::Full, package)?;
        let direct = self.listing(arch, DistKind::Direct, package)?;
        let runtime = self.listing(arch, DistKind::Runtime, package)?;
        let deps = DependencySet::from_listings(package, full, direct, runtime);
        debug!(
            "{} on {}: {} deps, {} direct, {} runtime, {} direct runtime",
            package,
            arch,
            deps.full.len(),
            deps.direct.len(),
            deps.runtime.len(),
            deps.direct_runtime.len()
        );
        Ok(deps)
    }

    /// Download location of the artifact of `package`
    pub fn url(&self, arch: &str, package: &PackageRef) -> Result<String> {
        resolve_pointer(self.lister, &pointer_path(arch, package))
    }

    /// Dependencies, then artifact location
    pub fn resolve(&self, arch: &str, package: &PackageRef) -> Result<ResolvedCandidate> {
        let deps = self.dependencies(arch, package)?;
        let url = self.url(arch, package)?;
        Ok(ResolvedCandidate {
            package: package.clone(),
            deps,
            url,
        })
    }
}
