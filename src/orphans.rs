// src/orphans.rs

//! Orphan RPM detection
//!
//! An RPM repository only ever grows: every publication adds RPMs, nothing
//! removes the ones no release needs any more. This module finds them.
//!
//! Every RPM whose file name contains the marker (`O2` by default) is kept,
//! together with everything it requires, transitively. Requirements are read
//! with `rpm -qR --recommends --suggests` and mapped back to files of the
//! same directory:
//!
//! - file requirements (`/bin/sh`) and RPM features (`rpmlib(...)`) are
//!   ignored, as are packages without any local `<name>-*.<arch>.rpm`
//! - `name = version` maps to `<name>-<version>.<arch>.rpm`
//! - `name >= version` maps to the last local file whose version starts
//!   with `version`
//! - a bare `name` maps to the last local file of that package
//!
//! Any other operator is an error. An RPM that cannot be queried is kept
//! but contributes no requirements.

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

/// Default marker of RPMs to keep
pub const DEFAULT_MARKER: &str = "O2";

/// Reads the requirements of an RPM file
pub trait RequiresQuery {
    /// One requirement per entry, as printed by `rpm -qR`
    fn requires(&self, rpm: &Path) -> Result<Vec<String>>;
}

/// Queries the `rpm` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmQuery;

impl RequiresQuery for RpmQuery {
    fn requires(&self, rpm: &Path) -> Result<Vec<String>> {
        let output = Command::new("rpm")
            .args(["-qR", "--recommends", "--suggests"])
            .arg(rpm)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| Error::ScriptError(format!("Cannot run rpm: {e}")))?;
        if !output.status.success() {
            return Err(Error::NotFoundError(format!(
                "RPM not found or invalid: {}",
                rpm.display()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

/// Finds RPMs nothing marked depends on
pub struct OrphanFinder<Q: RequiresQuery> {
    dir: PathBuf,
    marker: String,
    rpm_arch: String,
    query: Q,
    cache: HashMap<PathBuf, Vec<PathBuf>>,
}

impl<Q: RequiresQuery> OrphanFinder<Q> {
    pub fn new(dir: impl Into<PathBuf>, query: Q) -> Self {
        Self {
            dir: dir.into(),
            marker: DEFAULT_MARKER.to_string(),
            rpm_arch: "x86_64".to_string(),
            query,
            cache: HashMap::new(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn with_rpm_arch(mut self, rpm_arch: impl Into<String>) -> Self {
        self.rpm_arch = rpm_arch.into();
        self
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&self.dir.display().to_string()),
            pattern
        );
        let paths = glob::glob(&full)
            .map_err(|e| Error::ParseError(format!("Bad pattern {full}: {e}")))?
            .filter_map(|p| p.ok())
            .collect::<Vec<_>>();
        Ok(paths)
    }

    /// Local RPMs of package `name`, sorted
    fn local_versions(&self, name: &str) -> Result<Vec<PathBuf>> {
        let mut paths = self.glob(&format!(
            "{}-*.{}.rpm",
            glob::Pattern::escape(name),
            self.rpm_arch
        ))?;
        paths.sort();
        Ok(paths)
    }

    /// Map one requirement line to a local file
    fn resolve_requirement(&self, rpm: &Path, spec: &str) -> Result<Option<PathBuf>> {
        let mut parts = spec.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(None);
        };
        if name.starts_with('/') || name.starts_with("rpmlib(") {
            return Ok(None);
        }
        let local = self.local_versions(name)?;
        if local.is_empty() {
            info!("Ignoring {}, RPM not found", name);
            return Ok(None);
        }

        let prefix = format!("{name}-");
        let suffix = format!(".{}.rpm", self.rpm_arch);
        let version_of = |path: &PathBuf| -> Option<String> {
            let file = path.file_name()?.to_str()?;
            Some(file.strip_prefix(&prefix)?.strip_suffix(&suffix)?.to_string())
        };

        match (parts.next(), parts.next()) {
            (None, _) => Ok(local.last().cloned()),
            (Some("="), Some(version)) => Ok(Some(self.dir.join(format!("{name}-{version}{suffix}")))),
            (Some(">="), Some(version)) => Ok(local
                .iter()
                .filter(|p| version_of(p).is_some_and(|v| v.starts_with(version)))
                .next_back()
                .cloned()),
            _ => Err(Error::ParseError(format!(
                "Unexpected dependency expression '{spec}' in {}",
                rpm.display()
            ))),
        }
    }

    /// Direct requirements of `rpm` that exist as local files, memoized
    fn requirements(&mut self, rpm: &Path) -> Result<Vec<PathBuf>> {
        if let Some(cached) = self.cache.get(rpm) {
            return Ok(cached.clone());
        }
        let specs = match self.query.requires(rpm) {
            Ok(specs) => specs,
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        };
        let mut resolved = Vec::new();
        for spec in &specs {
            if let Some(path) = self.resolve_requirement(rpm, spec)? {
                resolved.push(path);
            }
        }
        self.cache.insert(rpm.to_path_buf(), resolved.clone());
        Ok(resolved)
    }

    /// Marked RPMs and their requirement closure
    pub fn needed(&mut self) -> Result<BTreeSet<PathBuf>> {
        let mut needed = BTreeSet::new();
        let mut stack = self.glob(&format!("*{}*.rpm", glob::Pattern::escape(&self.marker)))?;
        info!("{} RPMs marked with {}", stack.len(), self.marker);

        while let Some(rpm) = stack.pop() {
            if !needed.insert(rpm.clone()) {
                continue;
            }
            for dep in self.requirements(&rpm)? {
                if !needed.contains(&dep) {
                    debug!("{} needs {}", rpm.display(), dep.display());
                    stack.push(dep);
                }
            }
        }
        Ok(needed)
    }

    /// Every RPM of the directory that is not needed, sorted
    pub fn orphans(&mut self) -> Result<Vec<PathBuf>> {
        let needed = self.needed()?;
        let mut orphans: Vec<PathBuf> = self
            .glob("*.rpm")?
            .into_iter()
            .filter(|p| !needed.contains(p))
            .collect();
        orphans.sort();
        Ok(orphans)
    }
}

/// Quote a string for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Requirements keyed by file name
    struct FakeQuery(HashMap<String, Vec<&'static str>>);

    impl RequiresQuery for FakeQuery {
        fn requires(&self, rpm: &Path) -> Result<Vec<String>> {
            let name = rpm.file_name().unwrap().to_string_lossy().into_owned();
            self.0
                .get(&name)
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .ok_or_else(|| Error::NotFoundError(name))
        }
    }

    fn repo(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            fs::write(tmp.path().join(f), b"").unwrap();
        }
        tmp
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_closure_and_orphans() {
        let tmp = repo(&[
            "alisw-O2+v1-1-1.el7.x86_64.rpm",
            "alisw-ROOT+v6-1-1-1.el7.x86_64.rpm",
            "alisw-zlib+v1-1-1.el7.x86_64.rpm",
            "alisw-aliswmod-1-1.el7.x86_64.rpm",
            "alisw-aliswmod-2-1.el7.x86_64.rpm",
            "alisw-old+v0-1-1.el7.x86_64.rpm",
        ]);
        let mut deps = HashMap::new();
        deps.insert(
            "alisw-O2+v1-1-1.el7.x86_64.rpm".to_string(),
            vec![
                "/bin/sh",
                "rpmlib(PayloadIsXz) <= 5.2-1",
                "alisw-ROOT+v6-1 = 1-1.el7",
                "alisw-aliswmod >= 2",
                "environment-modules",
            ],
        );
        deps.insert(
            "alisw-ROOT+v6-1-1-1.el7.x86_64.rpm".to_string(),
            vec!["alisw-zlib+v1 = 1-1.el7", "alisw-aliswmod"],
        );
        deps.insert("alisw-zlib+v1-1-1.el7.x86_64.rpm".to_string(), vec![]);
        deps.insert("alisw-aliswmod-2-1.el7.x86_64.rpm".to_string(), vec![]);

        let mut finder = OrphanFinder::new(tmp.path(), FakeQuery(deps));
        let orphans = finder.orphans().unwrap();
        assert_eq!(
            names(&orphans),
            vec!["alisw-aliswmod-1-1.el7.x86_64.rpm", "alisw-old+v0-1-1.el7.x86_64.rpm"]
        );
    }

    #[test]
    fn test_unexpected_operator_is_error() {
        let tmp = repo(&["alisw-O2+v1-1-1.el7.x86_64.rpm", "alisw-x-1-1.el7.x86_64.rpm"]);
        let mut deps = HashMap::new();
        deps.insert("alisw-O2+v1-1-1.el7.x86_64.rpm".to_string(), vec!["alisw-x < 2"]);
        let mut finder = OrphanFinder::new(tmp.path(), FakeQuery(deps));
        assert!(matches!(finder.orphans(), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_failed_query_keeps_rpm() {
        let tmp = repo(&["alisw-O2+v1-1-1.el7.x86_64.rpm", "alisw-y-1-1.el7.x86_64.rpm"]);
        let mut finder = OrphanFinder::new(tmp.path(), FakeQuery(HashMap::new()));
        assert_eq!(names(&finder.orphans().unwrap()), vec!["alisw-y-1-1.el7.x86_64.rpm"]);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/repo/alisw-ROOT+v6-1.rpm"), "/repo/alisw-ROOT+v6-1.rpm");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_quote(""), "''");
    }
}
