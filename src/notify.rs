// src/notify.rs

//! Publication notifications
//!
//! After the backend has published, every processed candidate is reported
//! to a [`NotificationSink`]. The [`TemplateNotifier`] picks the first rule
//! whose pattern matches the package name, renders its success or failure
//! message and hands it to a [`Mailer`].
//!
//! ```toml
//! [notification]
//! sender = "publisher@example.org"
//!
//! [[notification.rules]]
//! pattern = "^O2"
//! success = { to = ["o2-ops@example.org"], subject = "{{package}} {{version}} published", body = "..." }
//! failure = { to = ["o2-ops@example.org"], subject = "{{package}} {{version}} failed", body = "..." }
//! ```
//!
//! Delivery is best effort: a missing mail command, an empty recipient
//! list or an empty body turn a notification into a no-op, and delivery
//! errors are logged, never propagated.

use crate::error::{Error, Result};
use crate::package::PackageRef;
use crate::template::{Template, TemplateVars};
use regex::Regex;
use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

/// Keys available to message templates
pub const MESSAGE_KEYS: &[&str] = &["package", "version", "arch", "deps", "all_deps"];

/// Default mail command; reads recipients from the headers
pub const DEFAULT_MAIL_COMMAND: &str = "/usr/sbin/sendmail -t";

/// Outcome of one candidate, as seen by notification sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub package: PackageRef,
    /// Store architecture
    pub arch: String,
    pub success: bool,
    /// Direct runtime dependencies
    pub deps: Vec<PackageRef>,
    /// Every runtime dependency
    pub all_deps: Vec<PackageRef>,
}

impl PublishRecord {
    fn vars(&self) -> TemplateVars {
        let join = |deps: &[PackageRef]| {
            deps.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        };
        let mut vars = TemplateVars::new();
        vars.insert("package", self.package.name.clone());
        vars.insert("version", self.package.version.clone());
        vars.insert("arch", self.arch.clone());
        vars.insert("deps", join(&self.deps));
        vars.insert("all_deps", join(&self.all_deps));
        vars
    }
}

/// Receives the records of a published run
pub trait NotificationSink {
    fn notify(&self, record: &PublishRecord);
}

/// Logs every record
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, record: &PublishRecord) {
        if record.success {
            info!("Published {} for {}", record.package, record.arch);
        } else {
            warn!("Failed to publish {} for {}", record.package, record.arch);
        }
    }
}

/// Raw message template
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageConfig {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Raw notification rule
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRule {
    /// Searched in the package name
    pub pattern: String,
    #[serde(default)]
    pub success: Option<MessageConfig>,
    #[serde(default)]
    pub failure: Option<MessageConfig>,
}

fn default_command() -> String {
    DEFAULT_MAIL_COMMAND.to_string()
}

/// `[notification]` section
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub rules: Vec<NotificationRule>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            sender: None,
            rules: Vec::new(),
        }
    }
}

/// Compiled message template
#[derive(Debug, Clone)]
pub struct TextTemplate {
    to: Vec<String>,
    subject: Template,
    body: Template,
}

impl TextTemplate {
    pub fn compile(raw: &MessageConfig) -> Result<Self> {
        Ok(Self {
            to: raw.to.clone(),
            subject: Template::parse(&raw.subject, MESSAGE_KEYS)?,
            body: Template::parse(&raw.body, MESSAGE_KEYS)?,
        })
    }

    fn render(&self, from: &str, vars: &TemplateVars) -> Message {
        Message {
            from: from.to_string(),
            to: self.to.clone(),
            subject: self.subject.render(vars),
            body: self.body.render(vars),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Regex,
    success: Option<TextTemplate>,
    failure: Option<TextTemplate>,
}

impl NotificationConfig {
    fn compile_rules(&self) -> Result<Vec<CompiledRule>> {
        self.rules
            .iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern).map_err(|e| {
                    Error::ConfigError(format!("Invalid notification pattern '{}': {e}", rule.pattern))
                })?;
                Ok(CompiledRule {
                    pattern,
                    success: rule.success.as_ref().map(TextTemplate::compile).transpose()?,
                    failure: rule.failure.as_ref().map(TextTemplate::compile).transpose()?,
                })
            })
            .collect()
    }

    /// Check every pattern and template
    pub fn compile(&self) -> Result<()> {
        self.compile_rules().map(|_| ())
    }
}

/// A rendered mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Message {
    /// Nothing worth sending
    pub fn is_empty(&self) -> bool {
        self.to.is_empty() || self.body.trim().is_empty()
    }

    /// Format as an RFC 822 message
    pub fn to_rfc822(&self) -> String {
        let mut out = String::new();
        if !self.from.is_empty() {
            out.push_str(&format!("From: {}\n", self.from));
        }
        out.push_str(&format!("To: {}\n", self.to.join(", ")));
        out.push_str(&format!("Subject: {}\n", self.subject));
        out.push_str(&format!("Date: {}\n", chrono::Utc::now().to_rfc2822()));
        out.push('\n');
        out.push_str(&self.body);
        if !self.body.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Delivers rendered messages
pub trait Mailer {
    fn send(&self, message: &Message) -> Result<()>;
}

/// Pipes messages to a mail command such as `sendmail -t`
#[derive(Debug, Clone)]
pub struct CommandMailer {
    command: String,
}

impl CommandMailer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Mailer for CommandMailer {
    fn send(&self, message: &Message) -> Result<()> {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            debug!("No mail command configured");
            return Ok(());
        };
        let Ok(program) = which::which(program) else {
            warn!("Mail command {} not found, not sending '{}'", program, message.subject);
            return Ok(());
        };

        let mut child = Command::new(&program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| Error::ScriptError(format!("Cannot run {}: {e}", program.display())))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.to_rfc822().as_bytes())?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(Error::ScriptError(format!(
                "{} exited with {}",
                program.display(),
                status
            )));
        }
        debug!("Sent '{}' to {}", message.subject, message.to.join(", "));
        Ok(())
    }
}

/// Renders per-package messages and hands them to a mailer
pub struct TemplateNotifier {
    rules: Vec<CompiledRule>,
    sender: String,
    mailer: Box<dyn Mailer>,
}

impl TemplateNotifier {
    pub fn new(config: &NotificationConfig, mailer: Box<dyn Mailer>) -> Result<Self> {
        Ok(Self {
            rules: config.compile_rules()?,
            sender: config.sender.clone().unwrap_or_default(),
            mailer,
        })
    }

    /// Notifier delivering through the configured command
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        Self::new(config, Box::new(CommandMailer::new(config.command.clone())))
    }

    /// Message for `record`, if a rule asks for one
    pub fn render(&self, record: &PublishRecord) -> Option<Message> {
        let rule = self
            .rules
            .iter()
            .find(|r| r.pattern.is_match(&record.package.name))?;
        let template = if record.success {
            rule.success.as_ref()
        } else {
            rule.failure.as_ref()
        }?;
        Some(template.render(&self.sender, &record.vars()))
    }
}

impl NotificationSink for TemplateNotifier {
    fn notify(&self, record: &PublishRecord) {
        let Some(message) = self.render(record) else {
            debug!("No notification for {}", record.package);
            return;
        };
        if message.is_empty() {
            debug!("Empty notification for {}, not sending", record.package);
            return;
        }
        if let Err(e) = self.mailer.send(&message) {
            error!("Notification for {} failed: {}", record.package, e);
        }
    }
}
