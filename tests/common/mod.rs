// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use pubsync::backend::TxnTracker;
use pubsync::template::TemplateVars;
use pubsync::{
    BackendKind, Config, DirEntry, DirectoryLister, Error, ExecOutput, InstallExecutor,
    InstallRequest, NotificationSink, PackageRef, PublishBackend, PublishRecord, Result,
    ScriptTemplate, TxnState,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// In-memory artifact store
#[derive(Default)]
pub struct MemoryStore {
    dirs: BTreeMap<String, Vec<DirEntry>>,
    files: HashMap<String, String>,
    pub list_calls: RefCell<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, dir: &str, entry: DirEntry) {
        let entries = self.dirs.entry(dir.to_string()).or_default();
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    /// Add a version with its pointer and its three dependency listings;
    /// `None` leaves a listing out
    pub fn package(
        &mut self,
        arch: &str,
        pkg: &PackageRef,
        full: Option<&[&PackageRef]>,
        direct: Option<&[&PackageRef]>,
        runtime: Option<&[&PackageRef]>,
    ) -> &mut Self {
        let tarball = pkg.tarball_name(arch);
        self.push(&format!("TARS/{arch}"), DirEntry::directory(pkg.name.clone()));
        self.push(&format!("TARS/{arch}/{}", pkg.name), DirEntry::file(tarball.clone()));
        let bucket = &pkg.name[..1];
        self.files.insert(
            format!("TARS/{arch}/{}/{tarball}", pkg.name),
            format!("../store/{bucket}/{tarball}"),
        );
        self.push(&format!("TARS/{arch}"), DirEntry::directory("store"));
        self.push(&format!("TARS/{arch}/store"), DirEntry::directory(bucket));
        self.push(&format!("TARS/{arch}/store/{bucket}"), DirEntry::file(tarball.clone()));

        for (kind, listing) in [("dist", full), ("dist-direct", direct), ("dist-runtime", runtime)] {
            let Some(deps) = listing else { continue };
            self.push(&format!("TARS/{arch}"), DirEntry::directory(kind));
            self.push(&format!("TARS/{arch}/{kind}"), DirEntry::directory(pkg.name.clone()));
            self.push(
                &format!("TARS/{arch}/{kind}/{}", pkg.name),
                DirEntry::directory(pkg.dist_dir_name()),
            );
            let dir = format!("TARS/{arch}/{kind}/{}/{}", pkg.name, pkg.dist_dir_name());
            self.push(&dir, DirEntry::file(tarball.clone()));
            for dep in deps {
                self.push(&dir, DirEntry::file(dep.tarball_name(arch)));
            }
        }
        self
    }

    /// A version whose dependency listings are all complete
    pub fn simple(&mut self, arch: &str, pkg: &PackageRef, deps: &[&PackageRef]) -> &mut Self {
        self.package(arch, pkg, Some(deps), Some(deps), Some(deps))
    }

    pub fn remove_pointer(&mut self, arch: &str, pkg: &PackageRef) {
        self.files
            .remove(&format!("TARS/{arch}/{}/{}", pkg.name, pkg.tarball_name(arch)));
    }
}

impl DirectoryLister for MemoryStore {
    fn list(&self, path: &str) -> Vec<DirEntry> {
        let path = path.trim_matches('/');
        self.list_calls.borrow_mut().push(path.to_string());
        self.dirs.get(path).cloned().unwrap_or_default()
    }

    fn read(&self, path: &str) -> Result<String> {
        self.files
            .get(path.trim_matches('/'))
            .cloned()
            .ok_or_else(|| Error::NotFoundError(path.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("https://store.test/{path}")
    }
}

/// Backend double recording every call
pub struct FakeBackend {
    pub txn: TxnTracker,
    pub installed: HashSet<(String, PackageRef)>,
    pub failing: HashSet<String>,
    pub refuse_transaction: bool,
    pub fail_publish: bool,
    pub fail_abort: bool,
    /// `installed()` fails for this package name
    pub unreachable: Option<String>,
    pub calls: Vec<String>,
    pub requests: Vec<(String, PackageRef, String, Vec<PackageRef>, Vec<PackageRef>)>,
    pub commits: usize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            txn: TxnTracker::new(),
            installed: HashSet::new(),
            failing: HashSet::new(),
            refuse_transaction: false,
            fail_publish: false,
            fail_abort: false,
            unreachable: None,
            calls: Vec::new(),
            requests: Vec::new(),
            commits: 0,
        }
    }

    pub fn fail_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn installs(&self) -> usize {
        self.requests.len()
    }
}

impl PublishBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dir
    }

    fn installed(&mut self, arch: &str, package: &PackageRef) -> Result<bool> {
        if self.unreachable.as_deref() == Some(package.name.as_str()) {
            return Err(Error::BackendError(format!("cannot query {package}")));
        }
        Ok(self.installed.contains(&(arch.to_string(), package.clone())))
    }

    fn install(&mut self, request: &InstallRequest<'_>) -> i32 {
        self.calls.push(format!("install {}", request.package));
        self.requests.push((
            request.arch.to_string(),
            request.package.clone(),
            request.url.to_string(),
            request.direct_runtime.to_vec(),
            request.runtime.to_vec(),
        ));
        if self.failing.contains(&request.package.name) {
            return 1;
        }
        self.installed
            .insert((request.arch.to_string(), request.package.clone()));
        self.txn.record_change();
        0
    }

    fn transaction(&mut self) -> bool {
        self.calls.push("transaction".to_string());
        if self.refuse_transaction {
            return false;
        }
        if !self.txn.is_open() {
            self.txn.begin();
        }
        true
    }

    fn abort(&mut self, force: bool) -> bool {
        self.calls.push(format!("abort force={force}"));
        if self.fail_abort {
            return false;
        }
        if self.txn.is_open() || force {
            self.txn.close(TxnState::Aborted);
        }
        true
    }

    fn publish(&mut self) -> bool {
        self.calls.push("publish".to_string());
        if self.txn.changes() == 0 {
            return self.abort(false);
        }
        if self.fail_publish {
            return false;
        }
        self.commits += 1;
        self.txn.close(TxnState::Committed);
        true
    }

    fn state(&self) -> TxnState {
        self.txn.state()
    }

    fn changes(&self) -> usize {
        self.txn.changes()
    }
}

/// Collects notification records
#[derive(Default)]
pub struct RecordingSink {
    pub records: RefCell<Vec<PublishRecord>>,
}

impl NotificationSink for RecordingSink {
    fn notify(&self, record: &PublishRecord) {
        self.records.borrow_mut().push(record.clone());
    }
}

/// Executor that "installs" by creating the stage directory and a marker
/// file, failing for packages in `failing`
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    pub rendered: Rc<RefCell<Vec<String>>>,
    pub failing: Rc<RefCell<HashSet<String>>>,
}

impl InstallExecutor for RecordingExecutor {
    fn run(&self, _label: &str, script: &ScriptTemplate, vars: &TemplateVars) -> Result<ExecOutput> {
        self.rendered.borrow_mut().push(script.render(vars));
        let package = vars.get("package").cloned().unwrap_or_default();
        if let Some(stage) = vars.get("stagedir").filter(|s| !s.is_empty()) {
            fs::create_dir_all(stage)?;
            fs::write(Path::new(stage).join(".installed"), &package)?;
        }
        let status = if self.failing.borrow().contains(&package) { 1 } else { 0 };
        Ok(ExecOutput {
            status,
            ..ExecOutput::default()
        })
    }
}

pub fn pkg(name: &str, version: &str) -> PackageRef {
    PackageRef::new(name, version)
}

/// Configuration publishing `el9` as `el9-out` to `dir`; `rules` holds
/// top-level keys and tables
pub fn config(rules: &str) -> Config {
    Config::parse(&format!(
        r#"
        {rules}

        [store]
        base_url = "https://store.test"

        [architectures.el9]
        publish_as = {{ dir = "el9-out" }}

        [backends.dir]
        package_dir = "/nonexistent"
        install = "true"
        "#
    ))
    .expect("valid test configuration")
}
