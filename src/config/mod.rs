// src/config/mod.rs

//! Publisher configuration
//!
//! The configuration is a TOML document. It is parsed into plain serde
//! structures, checked, and turned into an immutable [`Config`] together
//! with the resolved [`RuleSet`]. Nothing touches the store or a backend
//! before this succeeds.
//!
//! ```toml
//! filter_order = "include,exclude"
//! auto_include_deps = true
//!
//! [store]
//! base_url = "https://store.example.org"
//!
//! [connection]
//! ssl_verify = true
//! timeout = 30
//! retries = 3
//! throttle = 0.5
//!
//! [include]
//! ROOT = ["^v6-"]
//! O2 = true
//!
//! [exclude]
//! ROOT = ["^v6-00-"]
//!
//! [architectures.slc7_x86-64]
//! publish_as = { cvmfs = "el7-x86_64", rpm = "el7.x86_64" }
//! include = { GCC-Toolchain = true }
//!
//! [backends.cvmfs]
//! repository = "sw.example.org"
//! package_dir = "/cvmfs/sw.example.org"
//! install = "..."
//! ```

mod backends;

pub use backends::{BackendConfigs, CvmfsConfig, FilesystemConfig, PackmanConfig, RpmConfig};

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::notify::NotificationConfig;
use crate::rules::{ArchRules, FilterOrder, RuleMap, RuleSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pubsync/pubsync.toml";

/// Where the store lives
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `http(s)://` URL or local directory of the store root
    pub base_url: String,

    /// Capture every architecture's tree once before selecting
    #[serde(default = "default_snapshot")]
    pub snapshot: bool,
}

fn default_snapshot() -> bool {
    true
}

/// Remote access parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Verify TLS certificates
    pub ssl_verify: bool,
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Attempts per request
    pub retries: u32,
    /// Delay between requests in seconds
    pub throttle: f64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ssl_verify: true,
            timeout: 30,
            retries: 3,
            throttle: 0.0,
        }
    }
}

impl ConnectionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_secs_f64(self.throttle.max(0.0))
    }
}

/// One architecture of the store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchConfig {
    /// Destination name of this architecture per backend (`dir`, `cvmfs`,
    /// `packman`, `rpm`)
    #[serde(default)]
    pub publish_as: BTreeMap<String, String>,

    #[serde(default)]
    pub include: RuleMap,

    #[serde(default)]
    pub exclude: RuleMap,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    store: StoreConfig,
    #[serde(default)]
    connection: ConnectionSettings,
    #[serde(default)]
    filter_order: Option<String>,
    #[serde(default)]
    auto_include_deps: bool,
    architectures: BTreeMap<String, ArchConfig>,
    #[serde(default)]
    include: RuleMap,
    #[serde(default)]
    exclude: RuleMap,
    #[serde(default)]
    backends: BackendConfigs,
    #[serde(default)]
    notification: NotificationConfig,
}

/// Validated, read-only configuration of a run
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub connection: ConnectionSettings,
    pub filter_order: FilterOrder,
    pub auto_include_deps: bool,
    pub architectures: BTreeMap<String, ArchConfig>,
    pub include: RuleMap,
    pub exclude: RuleMap,
    pub backends: BackendConfigs,
    pub notification: NotificationConfig,
}

/// Check the shape of fields whose type errors deserve a precise message
fn check_shape(doc: &toml::Table) -> Result<()> {
    match doc.get("architectures") {
        None => return Err(Error::ConfigError("Missing 'architectures' table".to_string())),
        Some(toml::Value::Table(_)) => {}
        Some(other) => {
            return Err(Error::ConfigError(format!(
                "'architectures' must be a mapping, found {}",
                other.type_str()
            )));
        }
    }
    if let Some(value) = doc.get("auto_include_deps")
        && !value.is_bool()
    {
        return Err(Error::ConfigError(format!(
            "'auto_include_deps' must be a boolean, found {}",
            value.type_str()
        )));
    }
    if let Some(value) = doc.get("filter_order")
        && !value.is_str()
    {
        return Err(Error::ConfigError(format!(
            "'filter_order' must be a string, found {}",
            value.type_str()
        )));
    }
    Ok(())
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Cannot read {}: {e}", path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Self::parse(&content)
    }

    /// Parse and validate a configuration document
    pub fn parse(content: &str) -> Result<Self> {
        let doc: toml::Table = toml::from_str(content)?;
        check_shape(&doc)?;
        let raw: RawConfig = toml::Value::Table(doc)
            .try_into()
            .map_err(|e: toml::de::Error| Error::ConfigError(e.to_string()))?;

        let filter_order = match raw.filter_order.as_deref() {
            None => FilterOrder::default(),
            Some(s) => s.parse().map_err(Error::ConfigError)?,
        };

        for (arch, cfg) in &raw.architectures {
            for backend in cfg.publish_as.keys() {
                backend.parse::<BackendKind>().map_err(|e| {
                    Error::ConfigError(format!("Architecture {arch}: publish_as: {e}"))
                })?;
            }
        }

        let config = Self {
            store: raw.store,
            connection: raw.connection,
            filter_order,
            auto_include_deps: raw.auto_include_deps,
            architectures: raw.architectures,
            include: raw.include,
            exclude: raw.exclude,
            backends: raw.backends,
            notification: raw.notification,
        };
        // Compile once so bad patterns fail at load time
        config.rules()?;
        config.notification.compile()?;
        Ok(config)
    }

    /// Merge general and per-architecture rules into the resolved rule set
    pub fn rules(&self) -> Result<RuleSet> {
        self.architectures
            .iter()
            .try_fold(RuleSet::new(self.filter_order), |rules, (arch, cfg)| {
                let merged = ArchRules::build(&self.include, &self.exclude, &cfg.include, &cfg.exclude)
                    .map_err(|e| Error::ConfigError(format!("Architecture {arch}: {e}")))?;
                Ok(rules.with_arch(arch.clone(), merged))
            })
    }

    /// Destination name of `arch` for a backend, if it is published there
    pub fn target_arch(&self, arch: &str, backend: BackendKind) -> Option<&str> {
        self.architectures
            .get(arch)?
            .publish_as
            .get(backend.as_str())
            .map(String::as_str)
    }

    /// Fail unless the selected backend has its required section
    pub fn validate_for(&self, backend: BackendKind) -> Result<()> {
        self.backends.require(backend)?;
        if !self
            .architectures
            .values()
            .any(|a| a.publish_as.contains_key(backend.as_str()))
        {
            return Err(Error::ConfigError(format!(
                "No architecture is published to the {backend} backend"
            )));
        }
        Ok(())
    }
}
