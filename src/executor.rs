// src/executor.rs

//! External install procedure execution
//!
//! Backends never build shell command lines themselves. They fill a fixed
//! set of substitution variables and hand a [`ScriptTemplate`] to an
//! [`InstallExecutor`]. The shipped [`ShellExecutor`] runs the rendered text
//! with `/bin/sh -c`:
//!
//! - stdin nullified to prevent hangs
//! - stdout/stderr captured and logged line by line
//! - timeout protection; a killed script reports status -1

use crate::error::{Error, Result};
use crate::template::{Template, TemplateVars};
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Default timeout for one script (one hour: installs download large tarballs)
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Every variable an install-side template may reference
pub const SCRIPT_KEYS: &[&str] = &[
    "url",
    "package",
    "version",
    "arch",
    "deps",
    "all_deps",
    "workdir",
    "stagedir",
    "repodir",
    "repository",
    "ssl_verify",
    "timeout",
    "retries",
];

/// Template for a backend command, validated against [`SCRIPT_KEYS`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ScriptTemplate(Template);

impl ScriptTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        Template::parse(raw, SCRIPT_KEYS).map(Self)
    }

    pub fn render(&self, vars: &TemplateVars) -> String {
        self.0.render(vars)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ScriptTemplate {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

/// Captured result of one script run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs rendered templates
pub trait InstallExecutor {
    /// Run `script` with `vars`; `label` identifies the run in logs
    ///
    /// Only a failure to start the script is an error; a script that runs
    /// and fails reports it through [`ExecOutput::status`].
    fn run(&self, label: &str, script: &ScriptTemplate, vars: &TemplateVars) -> Result<ExecOutput>;
}

/// Executes templates with a POSIX shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: PathBuf,
    timeout: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use another shell binary
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

/// Drain a child pipe on a background thread so a chatty script cannot
/// block on a full pipe while we wait for it
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

impl InstallExecutor for ShellExecutor {
    fn run(&self, label: &str, script: &ScriptTemplate, vars: &TemplateVars) -> Result<ExecOutput> {
        let rendered = script.render(vars);
        debug!("[{}] {} -c {}", label, self.shell.display(), rendered);

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&rendered)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ScriptError(format!("Failed to spawn {label}: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status.code().unwrap_or(-1),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                warn!("[{}] timed out after {} seconds", label, self.timeout.as_secs());
                -1
            }
        };

        let output = ExecOutput {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };

        for line in output.stdout.lines() {
            info!("[{}] {}", label, line);
        }
        for line in output.stderr.lines() {
            warn!("[{}] {}", label, line);
        }
        if output.success() {
            debug!("[{}] completed successfully", label);
        } else {
            warn!("[{}] failed with exit code {}", label, output.status);
        }

        Ok(output)
    }
}
