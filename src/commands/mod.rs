// src/commands/mod.rs
//! Command handlers for the pubsync CLI

mod completions;
mod orphans;
mod rules;
mod sync;

pub use completions::cmd_completions;
pub use orphans::cmd_remove_orphans;
pub use rules::cmd_test_rules;
pub use sync::cmd_sync;

use anyhow::{Context, Result};
use pubsync::{Config, DirectoryLister, HttpLister, LocalLister};
use std::path::Path;
use tracing::debug;

/// Load and validate the configuration file
fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

/// Open the store named by the configuration
fn open_store(config: &Config) -> Result<Box<dyn DirectoryLister>> {
    let base = config.store.base_url.as_str();
    if base.starts_with("http://") || base.starts_with("https://") {
        debug!("Using HTTP store at {}", base);
        let lister = HttpLister::new(base, &config.connection)
            .with_context(|| format!("Cannot access store {base}"))?;
        Ok(Box::new(lister))
    } else {
        let root = base.strip_prefix("file://").unwrap_or(base);
        debug!("Using local store at {}", root);
        Ok(Box::new(LocalLister::new(root)))
    }
}
