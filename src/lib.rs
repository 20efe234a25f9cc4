// src/lib.rs

//! pubsync: package publication synchronizer
//!
//! Mirrors packages from an artifact store into publish destinations.
//!
//! # Architecture
//!
//! - Store: per-architecture tree of tarballs, pointer files and
//!   dependency listings, read through a [`store::DirectoryLister`]
//! - Rules: merged include/exclude rules decide which versions are wanted
//! - Selection: candidates per architecture, optionally with their runtime
//!   dependencies
//! - Backends: one transactional destination per run (directory tree,
//!   versioned filesystem, remote package manager or RPM repository)
//! - Notifications: per-package reports after a successful publish

pub mod backend;
pub mod config;
pub mod dependencies;
mod error;
pub mod executor;
pub mod notify;
pub mod orphans;
pub mod package;
pub mod rules;
pub mod selector;
pub mod store;
pub mod sync;
pub mod template;

pub use backend::{BackendContext, BackendKind, InstallRequest, PublishBackend, TxnState};
pub use config::{Config, ConnectionSettings, DEFAULT_CONFIG_PATH};
pub use dependencies::{DependencyResolver, DependencySet, ResolvedCandidate};
pub use error::{Error, Result};
pub use executor::{ExecOutput, InstallExecutor, ScriptTemplate, ShellExecutor};
pub use notify::{LogSink, NotificationSink, PublishRecord, TemplateNotifier};
pub use package::{KnownPackages, PackageRef};
pub use rules::{FilterOrder, RuleSet, RuleValue};
pub use selector::{CandidateSelector, Selection, SelectionOptions};
pub use store::{DirEntry, DirectoryLister, HttpLister, LocalLister, StoreSnapshot};
pub use sync::{ArchReport, OutcomeEntry, SyncError, SyncOptions, SyncReport, Synchronizer};
