//! Policy rule settings.
//!
//! These are plain data. Turning them into registered rules is the policy
//! crate's job; the only checks done here are structural (see
//! [`PolicySettings::validate`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Namespaces of the engine's own runtime types, never transformed.
pub const DEFAULT_INTERNAL_NAMESPACES: &[&str] = &["com.tc.", "com.terracottatech."];

/// Transformation policy configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySettings {
    /// Register the built-in library defaults before user rules.
    pub include_builtins: bool,
    /// Allow dynamically generated proxy subtypes to be transformed.
    pub allow_dynamic_subtypes: bool,
    /// Type-name prefixes that are never transformed.
    pub internal_namespaces: Vec<String>,
    /// Include/exclude rules, first entry consulted first.
    pub instrumented_classes: Vec<InstrumentedClass>,
    /// Patterns that are never transformed, whatever else matches.
    pub permanent_excludes: Vec<String>,
    /// Patterns naming types that cannot be safely shared.
    pub non_portable: Vec<String>,
    /// Lock rules.
    pub locks: Vec<LockSetting>,
    /// Member patterns for which autolocks are suppressed.
    pub autolock_excludes: Vec<String>,
    /// Root fields.
    pub roots: Vec<RootSetting>,
    /// Transient fields as `pkg.Type.field`.
    pub transient_fields: Vec<String>,
    /// Distributed method calls.
    pub distributed_methods: Vec<DistributedMethodSetting>,
    /// Custom rewriter ids keyed by type name.
    pub custom_rewriters: BTreeMap<String, String>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            include_builtins: true,
            allow_dynamic_subtypes: false,
            internal_namespaces: DEFAULT_INTERNAL_NAMESPACES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            instrumented_classes: Vec::new(),
            permanent_excludes: Vec::new(),
            non_portable: Vec::new(),
            locks: Vec::new(),
            autolock_excludes: Vec::new(),
            roots: Vec::new(),
            transient_fields: Vec::new(),
            distributed_methods: Vec::new(),
            custom_rewriters: BTreeMap::new(),
        }
    }
}

impl PolicySettings {
    /// Check that every expression is non-empty and every qualified field
    /// name has a type component.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.instrumented_classes {
            require_expression("instrumentedClasses", &rule.class_expression)?;
        }
        for pattern in &self.permanent_excludes {
            require_expression("permanentExcludes", pattern)?;
        }
        for pattern in &self.non_portable {
            require_expression("nonPortable", pattern)?;
        }
        for lock in &self.locks {
            require_expression("locks", &lock.method_expression)?;
            lock.validate()?;
        }
        for pattern in &self.autolock_excludes {
            require_expression("autolockExcludes", pattern)?;
        }
        for method in &self.distributed_methods {
            require_expression("distributedMethods", &method.method_expression)?;
        }
        for root in &self.roots {
            let _ = split_qualified_field(&root.field)?;
        }
        for field in &self.transient_fields {
            let _ = split_qualified_field(field)?;
        }
        Ok(())
    }
}

impl LockSetting {
    fn validate(&self) -> Result<()> {
        let Some(name) = &self.name else {
            return Ok(());
        };
        let message = if name.trim() == RESERVED_LOCK_NAME {
            "the name `autolock` is reserved for unnamed locks"
        } else if self.auto_synchronized {
            "autoSynchronized only applies to unnamed locks"
        } else {
            return Ok(());
        };
        Err(SettingsError::InvalidLock {
            method_expression: self.method_expression.clone(),
            message,
        })
    }
}

fn require_expression(section: &'static str, expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        return Err(SettingsError::EmptyExpression { section });
    }
    Ok(())
}

/// Split `pkg.Type.field` into (`pkg.Type`, `field`).
pub fn split_qualified_field(qualified: &str) -> Result<(&str, &str)> {
    match qualified.rsplit_once('.') {
        Some((type_name, field)) if !type_name.is_empty() && !field.is_empty() => {
            Ok((type_name, field))
        }
        _ => Err(SettingsError::UnqualifiedField(qualified.to_string())),
    }
}

/// Whether an instrumented-class entry includes or excludes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Transform matching types.
    #[default]
    Include,
    /// Leave matching types alone.
    Exclude,
}

/// One include or exclude entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentedClass {
    /// Include or exclude.
    #[serde(default)]
    pub kind: RuleKind,
    /// Type pattern.
    pub class_expression: String,
    /// Skip fields declared `transient`.
    #[serde(default)]
    pub honor_transient: bool,
    /// Preserve `volatile` semantics.
    #[serde(default)]
    pub honor_volatile: bool,
    /// Action when a shared instance is materialized locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_load: Option<OnLoadSetting>,
}

/// On-load action for includes.
///
/// JSON: `"callConstructor"`, `{"method": "init"}` or `{"script": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnLoadSetting {
    /// Run the no-argument constructor.
    CallConstructor,
    /// Invoke a named method.
    Method(String),
    /// Run a script.
    Script(String),
}

/// Lock level names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockLevelSetting {
    /// Shared read.
    Read,
    /// Exclusive write.
    Write,
    /// Concurrent (no mutual exclusion).
    Concurrent,
    /// Write acknowledged by the cluster before release.
    SynchronousWrite,
}

/// One lock rule.
///
/// Without a `name` the lock is an autolock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSetting {
    /// Member pattern.
    pub method_expression: String,
    /// Lock name for named locks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Lock level.
    pub level: LockLevelSetting,
    /// Autolock that also applies to unsynchronized members.
    #[serde(default)]
    pub auto_synchronized: bool,
    /// Free text recording where the rule came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

/// Name the engine gives unnamed locks. Named entries may not use it.
pub const RESERVED_LOCK_NAME: &str = "autolock";

/// One root field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSetting {
    /// Field as `pkg.Type.field`.
    pub field: String,
    /// Exposed root name (defaults to the qualified field).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explicit finality.
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
}

/// One distributed method call rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedMethodSetting {
    /// Member pattern.
    pub method_expression: String,
    /// Invoke on every node rather than only where the instance is resident.
    #[serde(default = "default_true")]
    pub run_on_all_nodes: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = PolicySettings::default();
        assert!(policy.include_builtins);
        assert!(!policy.allow_dynamic_subtypes);
        assert_eq!(policy.internal_namespaces, vec!["com.tc.", "com.terracottatech."]);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn instrumented_class_from_json() {
        let json = r#"{
            "kind": "include",
            "classExpression": "com.acme..*",
            "honorTransient": true,
            "onLoad": {"method": "rehydrate"}
        }"#;
        let rule: InstrumentedClass = serde_json::from_str(json).unwrap();
        assert_eq!(rule.kind, RuleKind::Include);
        assert!(rule.honor_transient);
        assert!(!rule.honor_volatile);
        assert_eq!(rule.on_load, Some(OnLoadSetting::Method("rehydrate".into())));
    }

    #[test]
    fn on_load_unit_variant_is_a_string() {
        let on_load: OnLoadSetting = serde_json::from_str("\"callConstructor\"").unwrap();
        assert_eq!(on_load, OnLoadSetting::CallConstructor);
    }

    #[test]
    fn lock_without_name_is_autolock() {
        let json = r#"{"methodExpression": "* com.acme.Counter.*(..)", "level": "synchronousWrite"}"#;
        let lock: LockSetting = serde_json::from_str(json).unwrap();
        assert!(lock.name.is_none());
        assert_eq!(lock.level, LockLevelSetting::SynchronousWrite);
        assert!(!lock.auto_synchronized);
    }

    #[test]
    fn root_final_keyword() {
        let root: RootSetting =
            serde_json::from_str(r#"{"field": "com.acme.App.cache", "final": false}"#).unwrap();
        assert_eq!(root.is_final, Some(false));
        assert!(root.name.is_none());
    }

    #[test]
    fn distributed_method_defaults_to_all_nodes() {
        let m: DistributedMethodSetting =
            serde_json::from_str(r#"{"methodExpression": "void com.acme.Bus.publish(..)"}"#)
                .unwrap();
        assert!(m.run_on_all_nodes);
    }

    #[test]
    fn split_field() {
        assert_eq!(
            split_qualified_field("com.acme.App.cache").unwrap(),
            ("com.acme.App", "cache")
        );
        assert!(split_qualified_field("cache").is_err());
        assert!(split_qualified_field("com.acme.App.").is_err());
    }

    #[test]
    fn validate_rejects_empty_expression() {
        let mut policy = PolicySettings::default();
        policy.permanent_excludes.push("  ".into());
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("permanentExcludes"));
    }

    #[test]
    fn validate_rejects_unqualified_root() {
        let mut policy = PolicySettings::default();
        policy.roots.push(RootSetting {
            field: "cache".into(),
            name: None,
            is_final: None,
        });
        assert!(matches!(policy.validate(), Err(SettingsError::UnqualifiedField(_))));
    }

    fn named_lock(name: &str, auto_synchronized: bool) -> LockSetting {
        LockSetting {
            method_expression: "* com.acme.Counter.*(..)".into(),
            name: Some(name.into()),
            level: LockLevelSetting::Write,
            auto_synchronized,
            provenance: None,
        }
    }

    #[test]
    fn validate_rejects_reserved_lock_name() {
        let mut policy = PolicySettings::default();
        policy.locks.push(named_lock(RESERVED_LOCK_NAME, false));
        let err = policy.validate().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidLock { .. }));
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn validate_rejects_auto_synchronized_named_lock() {
        let mut policy = PolicySettings::default();
        policy.locks.push(named_lock("counterLock", true));
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("autoSynchronized"));

        policy.locks[0].auto_synchronized = false;
        policy.validate().unwrap();
    }
}
