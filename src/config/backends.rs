// src/config/backends.rs

//! Per-backend configuration sections

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::executor::ScriptTemplate;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_CVMFS_TRANSACTION: &str = "cvmfs_server transaction {{repository}}";
pub const DEFAULT_CVMFS_PUBLISH: &str = "cvmfs_server publish {{repository}}";
pub const DEFAULT_CVMFS_ABORT: &str = "cvmfs_server abort -f {{repository}}";
pub const DEFAULT_CREATEREPO: &str = "createrepo --update {{repodir}}";

/// Every `[backends.*]` section; only the selected one is required
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfigs {
    pub dir: Option<FilesystemConfig>,
    pub cvmfs: Option<CvmfsConfig>,
    pub packman: Option<PackmanConfig>,
    pub rpm: Option<RpmConfig>,
}

impl BackendConfigs {
    /// Fail if the section for `kind` is absent
    pub fn require(&self, kind: BackendKind) -> Result<()> {
        let present = match kind {
            BackendKind::Dir => self.dir.is_some(),
            BackendKind::Cvmfs => self.cvmfs.is_some(),
            BackendKind::Packman => self.packman.is_some(),
            BackendKind::Rpm => self.rpm.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(Error::ConfigError(format!("Missing [backends.{kind}] section")))
        }
    }
}

/// `[backends.dir]`: a plain directory tree
#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemConfig {
    /// Root of the published tree
    pub package_dir: PathBuf,
    /// Unpacks one package into `{{stagedir}}`
    pub install: ScriptTemplate,
    /// Scratch directory handed to scripts as `{{workdir}}`
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

/// `[backends.cvmfs]`: a transactional versioned filesystem
#[derive(Debug, Clone, Deserialize)]
pub struct CvmfsConfig {
    pub repository: String,
    /// Mounted repository root, e.g. `/cvmfs/sw.example.org`
    pub package_dir: PathBuf,
    pub install: ScriptTemplate,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub transaction: Option<ScriptTemplate>,
    #[serde(default)]
    pub publish: Option<ScriptTemplate>,
    #[serde(default)]
    pub abort: Option<ScriptTemplate>,
}

impl CvmfsConfig {
    pub fn transaction_script(&self) -> Result<ScriptTemplate> {
        or_default(&self.transaction, DEFAULT_CVMFS_TRANSACTION)
    }

    pub fn publish_script(&self) -> Result<ScriptTemplate> {
        or_default(&self.publish, DEFAULT_CVMFS_PUBLISH)
    }

    pub fn abort_script(&self) -> Result<ScriptTemplate> {
        or_default(&self.abort, DEFAULT_CVMFS_ABORT)
    }
}

fn default_vo() -> String {
    "VO_ALICE".to_string()
}

/// `[backends.packman]`: a remote package manager
#[derive(Debug, Clone, Deserialize)]
pub struct PackmanConfig {
    /// Prefix of every catalogue entry (`<vo>@<name>::<version>`)
    #[serde(default = "default_vo")]
    pub vo: String,
    /// Prints the catalogue of `{{arch}}` on stdout
    pub list: ScriptTemplate,
    pub install: ScriptTemplate,
    /// Must succeed before a transaction is opened
    #[serde(default)]
    pub health: Option<ScriptTemplate>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_prefix() -> String {
    "alisw-".to_string()
}

fn default_rpm_arch() -> String {
    "x86_64".to_string()
}

/// `[backends.rpm]`: a yum repository
#[derive(Debug, Clone, Deserialize)]
pub struct RpmConfig {
    /// Live repository; one subdirectory per architecture
    pub repo_dir: PathBuf,
    /// Builds the RPM of one package into `{{stagedir}}`
    pub install: ScriptTemplate,
    /// Regenerates the metadata of `{{repodir}}`
    #[serde(default)]
    pub createrepo: Option<ScriptTemplate>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_rpm_arch")]
    pub rpm_arch: String,
    /// Parent of the staging directory; the system temp dir if unset
    #[serde(default)]
    pub staging_root: Option<PathBuf>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

impl RpmConfig {
    pub fn createrepo_script(&self) -> Result<ScriptTemplate> {
        or_default(&self.createrepo, DEFAULT_CREATEREPO)
    }
}

fn or_default(script: &Option<ScriptTemplate>, default: &str) -> Result<ScriptTemplate> {
    match script {
        Some(script) => Ok(script.clone()),
        None => ScriptTemplate::parse(default),
    }
}
