// src/store/mod.rs

//! Remote artifact store access
//!
//! The store is organized by architecture, package and version:
//!
//! ```text
//! TARS/<arch>/<name>/<name>-<version>.<arch>.tar.gz      pointer to the artifact
//! TARS/<arch>/dist/<name>/<name>-<version>/              full dependency closure
//! TARS/<arch>/dist-direct/<name>/<name>-<version>/       direct dependencies
//! TARS/<arch>/dist-runtime/<name>/<name>-<version>/      runtime dependencies
//! TARS/<arch>/store/...                                  actual tarballs
//! ```
//!
//! Entries of the `dist*` directories are tarball names of the packages in
//! the respective dependency set, the package itself included. The tarball
//! under `TARS/<arch>/<name>/` is a symlink-style pointer whose content is
//! the path of the real artifact relative to the pointer's directory.
//!
//! The core only needs the [`DirectoryLister`] capability. Listings are
//! blocking and may be slow; [`StoreSnapshot`] captures a whole
//! architecture once so the selector and resolver never hit the store twice
//! for the same directory.

mod http;
mod local;
mod snapshot;

pub use http::HttpLister;
pub use local::LocalLister;
pub use snapshot::StoreSnapshot;

use crate::error::{Error, Result};
use crate::package::PackageRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level directory holding every architecture
pub const TARS_DIR: &str = "TARS";

/// Content-addressed artifacts under `TARS/<arch>/`, reached only through
/// pointer files
pub const BLOB_DIR: &str = "store";

/// Directory names under `TARS/<arch>/` that are not packages
pub const RESERVED_DIRS: &[&str] = &["dist", "dist-direct", "dist-runtime", BLOB_DIR];

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    #[serde(other)]
    Other,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

/// Read access to the artifact store
pub trait DirectoryLister {
    /// List a directory; unknown or missing paths yield an empty listing
    fn list(&self, path: &str) -> Vec<DirEntry>;

    /// Read a small text file such as a pointer
    fn read(&self, path: &str) -> Result<String>;

    /// Absolute location of a store path, suitable for downloading
    fn url(&self, path: &str) -> String;
}

/// Which of the three dependency listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistKind {
    /// Full transitive closure
    Full,
    /// Immediate dependencies
    Direct,
    /// Dependencies needed at runtime
    Runtime,
}

impl DistKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            DistKind::Full => "dist",
            DistKind::Direct => "dist-direct",
            DistKind::Runtime => "dist-runtime",
        }
    }
}

/// `TARS/<arch>`
pub fn arch_dir(arch: &str) -> String {
    format!("{TARS_DIR}/{arch}")
}

/// `TARS/<arch>/<name>`
pub fn package_dir(arch: &str, name: &str) -> String {
    format!("{TARS_DIR}/{arch}/{name}")
}

/// `TARS/<arch>/<dist-kind>/<name>/<name>-<version>`
pub fn dist_dir(arch: &str, kind: DistKind, pkg: &PackageRef) -> String {
    format!(
        "{TARS_DIR}/{arch}/{}/{}/{}",
        kind.dir_name(),
        pkg.name,
        pkg.dist_dir_name()
    )
}

/// `TARS/<arch>/<name>/<name>-<version>.<arch>.tar.gz`
pub fn pointer_path(arch: &str, pkg: &PackageRef) -> String {
    format!("{}/{}", package_dir(arch, &pkg.name), pkg.tarball_name(arch))
}

/// Join `relative` onto directory `dir`, resolving `.` and `..`
///
/// Components that would climb above the root are dropped.
pub fn normalize_path(dir: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = if relative.starts_with('/') {
        Vec::new()
    } else {
        dir.split('/').filter(|p| !p.is_empty()).collect()
    };
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Follow a pointer file to the download URL of the artifact it names
pub fn resolve_pointer(lister: &dyn DirectoryLister, pointer: &str) -> Result<String> {
    let target = lister.read(pointer)?;
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::NotFoundError(format!("Empty pointer file {pointer}")));
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(target.to_string());
    }
    let dir = pointer.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let resolved = normalize_path(dir, target);
    debug!("Pointer {} -> {}", pointer, resolved);
    Ok(lister.url(&resolved))
}
