// src/rules/mod.rs

//! Include/exclude rule engine
//!
//! Rules decide which package versions of the store get published. Each rule
//! is keyed by package name and is one of:
//!
//! - `true`: every version matches
//! - `false`: no version matches
//! - a list of regular expressions: a version matches if any pattern is
//!   found anywhere in it (search semantics, not a full match)
//!
//! Rules exist at two levels: general ones that apply to every architecture
//! and architecture-specific ones. The two are merged once per architecture
//! when the configuration is loaded (see [`merge_rules`]), then compiled into
//! an immutable [`RuleSet`].
//!
//! # Evaluation order
//!
//! - `include,exclude`: a version passes if it matches the include rule and
//!   does not match the exclude rule.
//! - `exclude,include`: a version fails if it matches the exclude rule,
//!   otherwise it passes when there is no include rule or it matches it.

mod selftest;

pub use selftest::{
    RuleExpectations, SelfTestFailure, SelfTestReport, load_expectations, run_self_test,
};

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Rule value as written in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    /// Match everything (`true`) or nothing (`false`)
    Bool(bool),
    /// Match versions found by any of these patterns
    Patterns(Vec<String>),
}

impl RuleValue {
    fn is_empty_list(&self) -> bool {
        matches!(self, RuleValue::Patterns(p) if p.is_empty())
    }
}

/// Raw rules of one filter kind, keyed by package name
pub type RuleMap = BTreeMap<String, RuleValue>;

/// Which filter is consulted first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterOrder {
    #[default]
    IncludeFirst,
    ExcludeFirst,
}

impl FilterOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOrder::IncludeFirst => "include,exclude",
            FilterOrder::ExcludeFirst => "exclude,include",
        }
    }
}

impl FromStr for FilterOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.as_str() {
            "include,exclude" => Ok(FilterOrder::IncludeFirst),
            "exclude,include" => Ok(FilterOrder::ExcludeFirst),
            _ => Err(format!(
                "Invalid filter order '{s}': expected \"include,exclude\" or \"exclude,include\""
            )),
        }
    }
}

impl std::fmt::Display for FilterOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merge a general rule with an architecture-specific one
///
/// - a boolean on either side wins (the specific one is checked first)
/// - two lists concatenate, specific patterns first
/// - an unset or empty specific rule yields the general rule
///
/// Every combination of the two optional values is covered, so there is no
/// failure case: values that are neither booleans nor lists are rejected
/// when the configuration is deserialized.
pub fn merge_rules(general: Option<&RuleValue>, specific: Option<&RuleValue>) -> Option<RuleValue> {
    match (general, specific) {
        (_, Some(RuleValue::Bool(b))) => Some(RuleValue::Bool(*b)),
        (Some(RuleValue::Bool(b)), _) => Some(RuleValue::Bool(*b)),
        (Some(RuleValue::Patterns(g)), Some(RuleValue::Patterns(s))) => {
            let mut merged = s.clone();
            merged.extend(g.iter().cloned());
            Some(RuleValue::Patterns(merged))
        }
        (general, Some(s)) if s.is_empty_list() => general.cloned(),
        (None, Some(s)) => Some(s.clone()),
        (general, None) => general.cloned(),
    }
}

/// Merge two rule maps key by key
pub fn merge_rule_maps(general: &RuleMap, specific: &RuleMap) -> RuleMap {
    general
        .keys()
        .chain(specific.keys())
        .filter_map(|name| {
            merge_rules(general.get(name), specific.get(name)).map(|rule| (name.clone(), rule))
        })
        .collect()
}

/// A compiled rule
#[derive(Debug, Clone)]
pub enum Rule {
    All,
    Nothing,
    Patterns(Vec<Regex>),
}

impl Rule {
    pub fn compile(value: &RuleValue) -> Result<Self> {
        match value {
            RuleValue::Bool(true) => Ok(Rule::All),
            RuleValue::Bool(false) => Ok(Rule::Nothing),
            RuleValue::Patterns(patterns) => patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| Error::RuleError(format!("Invalid pattern '{p}': {e}")))
                })
                .collect::<Result<Vec<_>>>()
                .map(Rule::Patterns),
        }
    }

    /// Does this rule select `value`?
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Rule::All => true,
            Rule::Nothing => false,
            Rule::Patterns(patterns) => patterns.iter().any(|re| re.is_match(value)),
        }
    }
}

/// Match a value against an optional rule; an absent rule matches nothing
pub fn rule_matches(value: &str, rule: Option<&Rule>) -> bool {
    rule.is_some_and(|r| r.matches(value))
}

/// Decide whether `value` passes an include/exclude pair
pub fn apply_filter(
    value: &str,
    include: Option<&Rule>,
    exclude: Option<&Rule>,
    order: FilterOrder,
) -> bool {
    match order {
        FilterOrder::IncludeFirst => rule_matches(value, include) && !rule_matches(value, exclude),
        FilterOrder::ExcludeFirst => {
            if rule_matches(value, exclude) {
                return false;
            }
            include.is_none_or(|rule| rule.matches(value))
        }
    }
}

/// Compiled rules for a single architecture
#[derive(Debug, Clone, Default)]
pub struct ArchRules {
    include: BTreeMap<String, Rule>,
    exclude: BTreeMap<String, Rule>,
}

impl ArchRules {
    /// Merge general and specific maps and compile the result
    pub fn build(
        general_include: &RuleMap,
        general_exclude: &RuleMap,
        include: &RuleMap,
        exclude: &RuleMap,
    ) -> Result<Self> {
        Ok(Self {
            include: compile_map(&merge_rule_maps(general_include, include))?,
            exclude: compile_map(&merge_rule_maps(general_exclude, exclude))?,
        })
    }

    pub fn include(&self, package: &str) -> Option<&Rule> {
        self.include.get(package)
    }

    pub fn exclude(&self, package: &str) -> Option<&Rule> {
        self.exclude.get(package)
    }
}

fn compile_map(map: &RuleMap) -> Result<BTreeMap<String, Rule>> {
    map.iter()
        .map(|(name, value)| {
            Rule::compile(value)
                .map(|rule| (name.clone(), rule))
                .map_err(|e| match e {
                    Error::RuleError(msg) => Error::RuleError(format!("Package {name}: {msg}")),
                    other => other,
                })
        })
        .collect()
}

/// Resolved, immutable rule set for every configured architecture
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    order: FilterOrder,
    arches: BTreeMap<String, ArchRules>,
}

impl RuleSet {
    pub fn new(order: FilterOrder) -> Self {
        Self {
            order,
            arches: BTreeMap::new(),
        }
    }

    /// Add the merged rules of one architecture
    pub fn with_arch(mut self, arch: impl Into<String>, rules: ArchRules) -> Self {
        self.arches.insert(arch.into(), rules);
        self
    }

    pub fn order(&self) -> FilterOrder {
        self.order
    }

    pub fn arch(&self, arch: &str) -> Option<&ArchRules> {
        self.arches.get(arch)
    }

    /// Does `package` at `version` pass the filter for `arch`?
    ///
    /// Architectures without any rules fall back to empty rules.
    pub fn passes(&self, arch: &str, package: &str, version: &str) -> bool {
        let empty = ArchRules::default();
        let rules = self.arches.get(arch).unwrap_or(&empty);
        apply_filter(version, rules.include(package), rules.exclude(package), self.order)
    }

    /// Cheap name-level pre-check, before any version is listed
    ///
    /// Returns false only when no version of `package` can pass: with
    /// include first, the package has no include rule or includes nothing;
    /// with exclude first, the package is wholly excluded.
    pub fn may_pass(&self, arch: &str, package: &str) -> bool {
        let Some(rules) = self.arches.get(arch) else {
            return self.order == FilterOrder::ExcludeFirst;
        };
        match self.order {
            FilterOrder::IncludeFirst => {
                !matches!(rules.include(package), None | Some(Rule::Nothing))
            }
            FilterOrder::ExcludeFirst => !matches!(rules.exclude(package), Some(Rule::All)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(p: &[&str]) -> RuleValue {
        RuleValue::Patterns(p.iter().map(|s| s.to_string()).collect())
    }

    fn compiled(p: &[&str]) -> Rule {
        Rule::compile(&pats(p)).unwrap()
    }

    #[test]
    fn test_merge_lists_specific_first() {
        let merged = merge_rules(Some(&pats(&["^g1$", "^g2$"])), Some(&pats(&["^s1$"])));
        assert_eq!(merged, Some(pats(&["^s1$", "^g1$", "^g2$"])));
    }

    #[test]
    fn test_merge_boolean_wins() {
        for b in [true, false] {
            assert_eq!(
                merge_rules(Some(&pats(&["x"])), Some(&RuleValue::Bool(b))),
                Some(RuleValue::Bool(b))
            );
            assert_eq!(
                merge_rules(Some(&RuleValue::Bool(b)), Some(&pats(&["x"]))),
                Some(RuleValue::Bool(b))
            );
            assert_eq!(merge_rules(Some(&RuleValue::Bool(b)), None), Some(RuleValue::Bool(b)));
            assert_eq!(merge_rules(None, Some(&RuleValue::Bool(b))), Some(RuleValue::Bool(b)));
        }
        // Both booleans: the specific one decides
        assert_eq!(
            merge_rules(Some(&RuleValue::Bool(true)), Some(&RuleValue::Bool(false))),
            Some(RuleValue::Bool(false))
        );
    }

    #[test]
    fn test_merge_unset_or_empty_specific() {
        assert_eq!(merge_rules(Some(&pats(&["g"])), None), Some(pats(&["g"])));
        assert_eq!(merge_rules(Some(&pats(&["g"])), Some(&pats(&[]))), Some(pats(&["g"])));
        assert_eq!(merge_rules(None, Some(&pats(&["s"]))), Some(pats(&["s"])));
        assert_eq!(merge_rules(None, Some(&pats(&[]))), None);
        assert_eq!(merge_rules(None, None), None);
    }

    #[test]
    fn test_merge_rule_maps_union() {
        let mut general = RuleMap::new();
        general.insert("ROOT".into(), pats(&["^v6"]));
        general.insert("O2".into(), RuleValue::Bool(true));
        let mut specific = RuleMap::new();
        specific.insert("ROOT".into(), pats(&["^v5"]));
        specific.insert("GCC".into(), RuleValue::Bool(false));

        let merged = merge_rule_maps(&general, &specific);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["ROOT"], pats(&["^v5", "^v6"]));
        assert_eq!(merged["O2"], RuleValue::Bool(true));
        assert_eq!(merged["GCC"], RuleValue::Bool(false));
    }

    #[test]
    fn test_filter_order_parse() {
        assert_eq!("include,exclude".parse::<FilterOrder>(), Ok(FilterOrder::IncludeFirst));
        assert_eq!("exclude, include".parse::<FilterOrder>(), Ok(FilterOrder::ExcludeFirst));
        assert!("include".parse::<FilterOrder>().is_err());
    }

    #[test]
    fn test_pattern_is_search_not_full_match() {
        let rule = compiled(&["2-04"]);
        assert!(rule.matches("v6-22-04-1"));
        assert!(!rule.matches("v6-24-02-1"));
    }

    #[test]
    fn test_invalid_pattern_is_rule_error() {
        assert!(matches!(Rule::compile(&pats(&["(unclosed"])), Err(Error::RuleError(_))));
    }

    #[test]
    fn test_apply_filter_include_first() {
        let inc = compiled(&[".*"]);
        let exc = compiled(&["^v1$"]);
        assert!(apply_filter("v1", Some(&inc), None, FilterOrder::IncludeFirst));
        assert!(!apply_filter("v1", Some(&inc), Some(&exc), FilterOrder::IncludeFirst));
        assert!(apply_filter("v2", Some(&inc), Some(&exc), FilterOrder::IncludeFirst));
        // No include rule: nothing passes
        assert!(!apply_filter("v2", None, None, FilterOrder::IncludeFirst));
    }

    #[test]
    fn test_apply_filter_exclude_first() {
        let inc = compiled(&["^v2"]);
        let exc = compiled(&["^v1$"]);
        assert!(apply_filter("v3", None, None, FilterOrder::ExcludeFirst));
        assert!(!apply_filter("v1", None, Some(&exc), FilterOrder::ExcludeFirst));
        assert!(!apply_filter("v3", Some(&inc), Some(&exc), FilterOrder::ExcludeFirst));
        assert!(apply_filter("v2.1", Some(&inc), Some(&exc), FilterOrder::ExcludeFirst));
        assert!(!apply_filter("v3", Some(&Rule::Nothing), None, FilterOrder::ExcludeFirst));
    }

    #[test]
    fn test_apply_filter_symmetry() {
        let rules = [
            None,
            Some(Rule::All),
            Some(Rule::Nothing),
            Some(compiled(&["^v1"])),
            Some(compiled(&["2$", "^v3"])),
        ];
        let values = ["v1", "v12", "v2", "v3-2", "x"];
        for inc in &rules {
            for exc in &rules {
                for v in values {
                    let (i, e) = (inc.as_ref(), exc.as_ref());
                    assert_eq!(
                        apply_filter(v, i, e, FilterOrder::IncludeFirst),
                        rule_matches(v, i) && !rule_matches(v, e)
                    );
                    assert_eq!(
                        apply_filter(v, i, e, FilterOrder::ExcludeFirst),
                        !rule_matches(v, e) && (i.is_none() || rule_matches(v, i))
                    );
                }
            }
        }
    }

    #[test]
    fn test_explicit_version_exclusion() {
        let mut include = RuleMap::new();
        include.insert("Common-O2".into(), pats(&[".*"]));
        let mut exclude = RuleMap::new();
        exclude.insert("Common-O2".into(), pats(&[r"^v1\.2\.5-1$"]));
        let arch = ArchRules::build(&include, &exclude, &RuleMap::new(), &RuleMap::new()).unwrap();
        let rules = RuleSet::new(FilterOrder::IncludeFirst).with_arch("el8", arch);

        assert!(!rules.passes("el8", "Common-O2", "v1.2.5-1"));
        assert!(rules.passes("el8", "Common-O2", "v1.2.5-2"));
        assert!(rules.passes("el8", "Common-O2", "v1.2.5-10"));
    }

    #[test]
    fn test_empty_specific_list_without_general_rule() {
        let mut include = RuleMap::new();
        include.insert("ROOT".into(), pats(&[]));
        let arch = ArchRules::build(&RuleMap::new(), &RuleMap::new(), &include, &RuleMap::new()).unwrap();
        assert!(arch.include("ROOT").is_none());

        let exc_first = RuleSet::new(FilterOrder::ExcludeFirst).with_arch("el9", arch.clone());
        assert!(exc_first.passes("el9", "ROOT", "v6-1"));
        let inc_first = RuleSet::new(FilterOrder::IncludeFirst).with_arch("el9", arch);
        assert!(!inc_first.passes("el9", "ROOT", "v6-1"));
    }

    #[test]
    fn test_may_pass() {
        let mut include = RuleMap::new();
        include.insert("ROOT".into(), pats(&["^v6"]));
        include.insert("GCC".into(), RuleValue::Bool(false));
        let mut exclude = RuleMap::new();
        exclude.insert("Python".into(), RuleValue::Bool(true));
        let arch = ArchRules::build(&include, &exclude, &RuleMap::new(), &RuleMap::new()).unwrap();

        let inc_first = RuleSet::new(FilterOrder::IncludeFirst).with_arch("el8", arch.clone());
        assert!(inc_first.may_pass("el8", "ROOT"));
        assert!(!inc_first.may_pass("el8", "GCC"));
        assert!(!inc_first.may_pass("el8", "zlib"));

        let exc_first = RuleSet::new(FilterOrder::ExcludeFirst).with_arch("el8", arch);
        assert!(exc_first.may_pass("el8", "zlib"));
        assert!(exc_first.may_pass("el8", "GCC"));
        assert!(!exc_first.may_pass("el8", "Python"));
    }
}
