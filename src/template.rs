// src/template.rs

//! Closed-key text templates
//!
//! Templates use `{{key}}` placeholders (surrounding spaces allowed, as in
//! `{{ key }}`). Single braces are literal, so shell constructs such as
//! `${HOME}` or `find -exec rm {} +` pass through untouched. Every template
//! is parsed against a fixed set of allowed keys when the configuration is
//! loaded; an unknown key or an unterminated placeholder is a configuration
//! error, never a surprise at install time.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Values substituted into a template
pub type TemplateVars = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Key(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `raw`, accepting only the keys in `allowed`
    pub fn parse(raw: &str, allowed: &[&str]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                Error::ConfigError(format!("Unterminated placeholder in template: {raw}"))
            })?;
            let key = after[..end].trim();
            if !allowed.contains(&key) {
                return Err(Error::ConfigError(format!(
                    "Unknown template key '{key}' (allowed: {})",
                    allowed.join(", ")
                )));
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Substitute `vars`; keys without a value render as empty strings
    pub fn render(&self, vars: &TemplateVars) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Key(key) => vars.get(key.as_str()).map(String::as_str).unwrap_or(""),
            })
            .collect()
    }

    /// Keys referenced by this template, in order of appearance
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Key(key) => Some(key.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
