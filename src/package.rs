// src/package.rs

//! Package identities and artifact name parsing
//!
//! Artifacts in the store are tarballs named `<name>-<version>.<arch>.tar.gz`.
//! Because package names may contain dashes and may be prefixes of one
//! another (`Common` vs `Common-O2`), a tarball name can only be parsed
//! against a list of known package names, longest names tried first.

use std::fmt;

/// Suffix shared by every artifact in the store
pub const TARBALL_SUFFIX: &str = ".tar.gz";

/// A (name, version) pair identifying one published artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// File name of this package's tarball for an architecture
    pub fn tarball_name(&self, arch: &str) -> String {
        format!("{}-{}.{}{}", self.name, self.version, arch, TARBALL_SUFFIX)
    }

    /// Directory name used by the `dist*` dependency listings
    pub fn dist_dir_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Parse a tarball file name for one specific package name
pub fn parse_tarball(name: &str, file: &str, arch: &str) -> Option<PackageRef> {
    let stem = file.strip_suffix(TARBALL_SUFFIX)?.strip_suffix(arch)?.strip_suffix('.')?;
    let version = stem.strip_prefix(name)?.strip_prefix('-')?;
    if version.is_empty() {
        return None;
    }
    Some(PackageRef::new(name, version))
}

/// The set of package names present in the store for one architecture
///
/// Names are kept sorted by descending length. The sort is stable, so names
/// of equal length keep their listing order.
#[derive(Debug, Clone, Default)]
pub struct KnownPackages {
    names: Vec<String>,
}

impl KnownPackages {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { names }
    }

    /// Names, longest first
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Parse a tarball name against every known package name
    ///
    /// Returns `None` for entries that belong to no known package.
    pub fn parse_tarball(&self, file: &str, arch: &str) -> Option<PackageRef> {
        self.names
            .iter()
            .find_map(|name| parse_tarball(name, file, arch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tarball() {
        let pkg = parse_tarball("ROOT", "ROOT-v6-28-04-1.slc7_x86-64.tar.gz", "slc7_x86-64");
        assert_eq!(pkg, Some(PackageRef::new("ROOT", "v6-28-04-1")));
    }

    #[test]
    fn test_parse_tarball_rejects_other_arch_and_names() {
        assert_eq!(parse_tarball("ROOT", "ROOT-v1-1.osx_arm64.tar.gz", "slc7_x86-64"), None);
        assert_eq!(parse_tarball("ROOT", "ROOTX-v1-1.slc7_x86-64.tar.gz", "slc7_x86-64"), None);
        assert_eq!(parse_tarball("ROOT", "ROOT-.slc7_x86-64.tar.gz", "slc7_x86-64"), None);
        assert_eq!(parse_tarball("ROOT", "ROOT-v1-1.slc7_x86-64.tar.bz2", "slc7_x86-64"), None);
    }

    #[test]
    fn test_known_packages_prefers_longest_name() {
        let known = KnownPackages::new(vec!["Common".to_string(), "Common-O2".to_string()]);
        assert_eq!(known.names()[0], "Common-O2");

        let pkg = known.parse_tarball("Common-O2-v1.2.5-1.el8.tar.gz", "el8").unwrap();
        assert_eq!(pkg, PackageRef::new("Common-O2", "v1.2.5-1"));

        let pkg = known.parse_tarball("Common-v2-1.el8.tar.gz", "el8").unwrap();
        assert_eq!(pkg, PackageRef::new("Common", "v2-1"));

        assert!(known.parse_tarball("Unknown-v1-1.el8.tar.gz", "el8").is_none());
    }

    #[test]
    fn test_known_packages_stable_for_equal_length() {
        let known = KnownPackages::new(vec!["bbb".to_string(), "aaa".to_string(), "cc".to_string()]);
        assert_eq!(known.names(), &["bbb", "aaa", "cc"]);
    }

    #[test]
    fn test_display_and_names() {
        let pkg = PackageRef::new("zlib", "v1.2.13-1");
        assert_eq!(pkg.to_string(), "zlib/v1.2.13-1");
        assert_eq!(pkg.tarball_name("el9"), "zlib-v1.2.13-1.el9.tar.gz");
        assert_eq!(pkg.dist_dir_name(), "zlib-v1.2.13-1");
    }
}
