// src/selector.rs

//! Candidate selection
//!
//! For one architecture of the store, decides which (package, version)
//! pairs should be published: list the known packages, drop the ones the
//! rules can never let through, filter every version, and optionally pull
//! in the runtime dependencies of what was selected.

use crate::package::{KnownPackages, PackageRef, parse_tarball};
use crate::rules::RuleSet;
use crate::store::{DirectoryLister, DistKind, RESERVED_DIRS, arch_dir, dist_dir, package_dir};
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Result of selecting one architecture
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Package names present in the store, longest first
    pub known: KnownPackages,
    /// Selected versions, sorted by package name; ties keep discovery order
    pub candidates: Vec<PackageRef>,
}

/// Options for candidate selection
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionOptions {
    /// Add the runtime dependencies of every selected version
    pub auto_include_deps: bool,
}

/// Selects candidates from the store
pub struct CandidateSelector<'a> {
    lister: &'a dyn DirectoryLister,
    rules: &'a RuleSet,
    options: SelectionOptions,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(lister: &'a dyn DirectoryLister, rules: &'a RuleSet, options: SelectionOptions) -> Self {
        Self {
            lister,
            rules,
            options,
        }
    }

    /// Package names under `TARS/<arch>`
    pub fn known_packages(&self, arch: &str) -> KnownPackages {
        KnownPackages::new(
            self.lister
                .list(&arch_dir(arch))
                .into_iter()
                .filter(|e| e.is_dir() && !RESERVED_DIRS.contains(&e.name.as_str()))
                .map(|e| e.name),
        )
    }

    /// Versions of `name` published in the store
    pub fn versions(&self, arch: &str, name: &str) -> Vec<PackageRef> {
        self.lister
            .list(&package_dir(arch, name))
            .into_iter()
            .filter(|e| !e.is_dir())
            .filter_map(|e| parse_tarball(name, &e.name, arch))
            .collect()
    }

    pub fn select(&self, arch: &str) -> Selection {
        let known = self.known_packages(arch);
        info!("{}: {} packages in the store", arch, known.names().len());

        let mut seen: HashSet<PackageRef> = HashSet::new();
        let mut candidates = Vec::new();

        for name in known.names() {
            if !self.rules.may_pass(arch, name) {
                debug!("{}: {} filtered out by name", arch, name);
                continue;
            }

            for pkg in self.versions(arch, name) {
                if !self.rules.passes(arch, &pkg.name, &pkg.version) {
                    debug!("{}: {} filtered out", arch, pkg);
                    continue;
                }

                if !self.options.auto_include_deps {
                    if seen.insert(pkg.clone()) {
                        candidates.push(pkg);
                    }
                    continue;
                }

                let deps = self.lister.list(&dist_dir(arch, DistKind::Runtime, &pkg));
                if deps.is_empty() {
                    error!("{}: cannot list runtime dependencies of {}, skipping", arch, pkg);
                    continue;
                }
                if seen.insert(pkg.clone()) {
                    candidates.push(pkg.clone());
                }
                for dep in deps.iter().filter_map(|e| known.parse_tarball(&e.name, arch)) {
                    if seen.insert(dep.clone()) {
                        debug!("{}: {} pulled in by {}", arch, dep, pkg);
                        candidates.push(dep);
                    }
                }
            }
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        info!("{}: {} candidates selected", arch, candidates.len());
        Selection { known, candidates }
    }
}
