//! Rule registry and disposition lookup.
//!
//! Include/exclude rules live in one ordered list. Programmatic additions
//! are prepended, so the most recently added rule is consulted first and the
//! first match wins. Permanent-exclude and non-portable patterns are kept in
//! separate lists and are evaluated independently of the include/exclude
//! list.

use meld_core::TypeDescriptor;
use serde::{Deserialize, Serialize};

use crate::matcher::{PatternError, PatternMatcher};

/// Action taken when a shared instance is materialized locally.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnLoad {
    /// Nothing.
    #[default]
    None,
    /// Run the constructor.
    CallConstructor,
    /// Invoke a named method.
    Method(String),
    /// Run a script.
    Script(String),
}

impl OnLoad {
    /// Whether any action is configured.
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Attributes carried by an include rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeRule {
    /// Fields declared `transient` are not shared.
    pub honor_transient: bool,
    /// `volatile` fields keep volatile semantics.
    pub honor_volatile: bool,
    /// On-load action.
    pub on_load: OnLoad,
}

/// Outcome of a rule lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Transform, with the rule's attributes.
    Include(IncludeRule),
    /// Do not transform.
    Exclude,
    /// No rule matched. Treated as exclude.
    NoOpinion,
}

impl Disposition {
    /// Whether this is an include.
    pub fn is_include(&self) -> bool {
        matches!(self, Self::Include(_))
    }

    /// The include attributes, if this is an include.
    pub fn include_rule(&self) -> Option<&IncludeRule> {
        match self {
            Self::Include(rule) => Some(rule),
            _ => None,
        }
    }
}

/// An include or exclude rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    /// Type pattern.
    pub pattern: String,
    /// What a match means.
    pub disposition: Disposition,
}

impl Rule {
    /// An include rule.
    pub fn include(pattern: impl Into<String>, attributes: IncludeRule) -> Self {
        Self {
            pattern: pattern.into(),
            disposition: Disposition::Include(attributes),
        }
    }

    /// An exclude rule.
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            disposition: Disposition::Exclude,
        }
    }
}

/// Ordered rule collections.
#[derive(Clone, Debug, Default)]
pub struct RuleRegistry {
    include_exclude: Vec<Rule>,
    permanent_excludes: Vec<String>,
    non_portable: Vec<String>,
    internal_namespaces: Vec<String>,
    allow_dynamic_subtypes: bool,
}

impl RuleRegistry {
    /// Empty registry guarding the given internal namespaces.
    pub fn new<I, S>(internal_namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            internal_namespaces: internal_namespaces.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Prepend a rule so it is consulted before every existing rule.
    ///
    /// # Panics
    ///
    /// If the rule's disposition is [`Disposition::NoOpinion`].
    pub fn prepend(&mut self, rule: Rule) {
        assert!(
            rule.disposition != Disposition::NoOpinion,
            "no-opinion is a lookup result, not a rule: {}",
            rule.pattern
        );
        self.include_exclude.insert(0, rule);
    }

    /// Prepend a block of rules, keeping the block's own order.
    ///
    /// The first rule of the block becomes the first rule consulted.
    pub fn prepend_block(&mut self, rules: Vec<Rule>) {
        for rule in &rules {
            assert!(
                rule.disposition != Disposition::NoOpinion,
                "no-opinion is a lookup result, not a rule: {}",
                rule.pattern
            );
        }
        let _ = self.include_exclude.splice(0..0, rules);
    }

    /// Add a permanent-exclude pattern.
    pub fn add_permanent_exclude(&mut self, pattern: impl Into<String>) {
        self.permanent_excludes.insert(0, pattern.into());
    }

    /// Add a non-portable pattern.
    pub fn add_non_portable(&mut self, pattern: impl Into<String>) {
        self.non_portable.insert(0, pattern.into());
    }

    /// Allow or refuse dynamically generated proxy subtypes.
    pub fn set_allow_dynamic_subtypes(&mut self, allow: bool) {
        self.allow_dynamic_subtypes = allow;
    }

    /// Whether dynamically generated proxy subtypes may be transformed.
    pub fn allows_dynamic_subtypes(&self) -> bool {
        self.allow_dynamic_subtypes
    }

    /// Include/exclude rules, first consulted first.
    pub fn rules(&self) -> &[Rule] {
        &self.include_exclude
    }

    /// Permanent-exclude patterns.
    pub fn permanent_excludes(&self) -> &[String] {
        &self.permanent_excludes
    }

    /// Non-portable patterns.
    pub fn non_portable(&self) -> &[String] {
        &self.non_portable
    }

    /// Whether any include/exclude rule is registered.
    pub fn has_include_exclude_rules(&self) -> bool {
        !self.include_exclude.is_empty()
    }

    /// First matching include/exclude rule, or [`Disposition::NoOpinion`].
    pub fn resolve_disposition(
        &self,
        matcher: &dyn PatternMatcher,
        ty: &TypeDescriptor,
    ) -> Result<Disposition, PatternError> {
        for rule in &self.include_exclude {
            if matcher.match_type(&rule.pattern, ty)? {
                return Ok(rule.disposition.clone());
            }
        }
        Ok(Disposition::NoOpinion)
    }

    /// Whether the name falls in a namespace reserved for the engine itself.
    pub fn is_internal(&self, type_name: &str) -> bool {
        self.internal_namespaces
            .iter()
            .any(|prefix| type_name.starts_with(prefix.as_str()))
    }

    /// Whether any permanent-exclude pattern matches.
    pub fn is_permanently_excluded(
        &self,
        matcher: &dyn PatternMatcher,
        ty: &TypeDescriptor,
    ) -> Result<bool, PatternError> {
        any_match(matcher, &self.permanent_excludes, ty)
    }

    /// Whether any non-portable pattern matches.
    pub fn is_non_portable(
        &self,
        matcher: &dyn PatternMatcher,
        ty: &TypeDescriptor,
    ) -> Result<bool, PatternError> {
        any_match(matcher, &self.non_portable, ty)
    }
}

fn any_match(
    matcher: &dyn PatternMatcher,
    patterns: &[String],
    ty: &TypeDescriptor,
) -> Result<bool, PatternError> {
    for pattern in patterns {
        if matcher.match_type(pattern, ty)? {
            return Ok(true);
        }
    }
    Ok(false)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
