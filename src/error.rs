// src/error.rs

//! Crate-wide error type

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the publisher library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Illegal include/exclude rule combination or pattern
    #[error("Rule error: {0}")]
    RuleError(String),

    /// Filesystem or process I/O failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// Remote store request failed
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Unparseable listing, template or command output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Requested entry does not exist
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// External script could not be run
    #[error("Script error: {0}")]
    ScriptError(String),

    /// Destination backend is unavailable or misbehaving
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Rule self-test produced an unexpected result
    #[error("Rule self-test failed: {0}")]
    SelfTestError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::RuleError(e.to_string())
    }
}
