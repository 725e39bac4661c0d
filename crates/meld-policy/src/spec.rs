//! Per-type class specifications.

use std::collections::{BTreeMap, BTreeSet};

use meld_core::{MemberDescriptor, TypeName};
use serde::{Deserialize, Serialize};

use crate::errors::{PolicyError, Result};
use crate::rules::OnLoad;

/// How a type participates in transformation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformMode {
    /// No explicit mode; derived at decision time.
    #[default]
    Unset,
    /// Left untouched.
    NotAdaptable,
    /// Structural rewriting only, no shareable identity.
    AdaptableOnly,
    /// Full capability set.
    FullyTransformable,
}

impl TransformMode {
    /// Whether a mode was recorded explicitly.
    pub fn is_set(self) -> bool {
        self != Self::Unset
    }
}

impl std::fmt::Display for TransformMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unset => "unset",
            Self::NotAdaptable => "not-adaptable",
            Self::AdaptableOnly => "adaptable-only",
            Self::FullyTransformable => "fully-transformable",
        })
    }
}

/// Designation of a type handled by a hand-written substitute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalSpec {
    /// Identifier of the change applicator that replays logical changes.
    pub change_applicator: String,
    /// The logical type this one extends, for subtypes moved to logical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extending_type: Option<TypeName>,
}

/// Custom behavior attached to a single member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberBehavior {
    /// Record every call as a logical change.
    AlwaysLog,
    /// Record the call only when it returns `true`.
    IfTrueLog,
    /// Wrap the returned iterator so removals are recorded.
    IteratorWrapper,
    /// Wrap the returned collection view.
    ViewWrapper,
    /// Array copies routed through the shared graph.
    ArrayCopy,
    /// Leave wait/notify calls untouched.
    DisableWaitNotify,
    /// Behavior identified by an external rewriter id.
    Custom(String),
}

/// Which constructor runs when a shared instance is created locally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstructionBehavior {
    /// The no-argument constructor.
    #[default]
    DefaultConstructor,
    /// The type's own non-default constructor.
    NonDefaultConstructor,
}

/// Explicit policy for one type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSpec {
    name: TypeName,
    mode: TransformMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logical: Option<LogicalSpec>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    transient_fields: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    member_behaviors: BTreeMap<String, MemberBehavior>,
    #[serde(default)]
    construction: ConstructionBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_load: Option<OnLoad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pre_create_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_create_method: Option<String>,
    #[serde(default)]
    pre_instrumented: bool,
    #[serde(default)]
    version_specific: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    honor_transient: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    honor_volatile: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    excluded_methods: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_rewriter: Option<String>,
}

impl ClassSpec {
    /// A spec with every attribute unset.
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            mode: TransformMode::Unset,
            logical: None,
            transient_fields: BTreeSet::new(),
            member_behaviors: BTreeMap::new(),
            construction: ConstructionBehavior::DefaultConstructor,
            on_load: None,
            pre_create_method: None,
            post_create_method: None,
            pre_instrumented: false,
            version_specific: false,
            honor_transient: None,
            honor_volatile: None,
            excluded_methods: BTreeSet::new(),
            custom_rewriter: None,
        }
    }

    /// A logical spec replayed by `change_applicator`.
    pub fn logical(name: impl Into<TypeName>, change_applicator: impl Into<String>) -> Self {
        let mut spec = Self::new(name);
        spec.logical = Some(LogicalSpec {
            change_applicator: change_applicator.into(),
            extending_type: None,
        });
        spec
    }

    /// Type name.
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// Explicit mode.
    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    /// Record an explicit mode.
    pub fn set_mode(&mut self, mode: TransformMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Whether the type is handled by a hand-written substitute.
    pub fn is_logical(&self) -> bool {
        self.logical.is_some()
    }

    /// Logical designation, if any.
    pub fn logical_spec(&self) -> Option<&LogicalSpec> {
        self.logical.as_ref()
    }

    /// Change applicator id for logical types.
    pub fn change_applicator(&self) -> Option<&str> {
        self.logical.as_ref().map(|l| l.change_applicator.as_str())
    }

    /// The logical type this one was moved under.
    pub fn logical_extending_type(&self) -> Option<&TypeName> {
        self.logical.as_ref().and_then(|l| l.extending_type.as_ref())
    }

    /// Make this type logical, sharing the applicator of `super_spec`.
    ///
    /// The extending type is the super spec's own extending type when it has
    /// one, otherwise the super type itself.
    pub fn move_to_logical(&mut self, super_spec: &ClassSpec) -> Result<&mut Self> {
        let Some(super_logical) = super_spec.logical.as_ref() else {
            return Err(PolicyError::InvalidArgument {
                message: format!(
                    "cannot move {} under non-logical type {}",
                    self.name, super_spec.name
                ),
            });
        };
        let extending = super_logical
            .extending_type
            .clone()
            .unwrap_or_else(|| super_spec.name.clone());
        self.logical = Some(LogicalSpec {
            change_applicator: super_logical.change_applicator.clone(),
            extending_type: Some(extending),
        });
        Ok(self)
    }

    /// Field names declared transient by this spec.
    pub fn transient_fields(&self) -> &BTreeSet<String> {
        &self.transient_fields
    }

    /// Mark a field transient.
    pub fn add_transient(&mut self, field: impl Into<String>) -> &mut Self {
        let _ = self.transient_fields.insert(field.into());
        self
    }

    /// Attach a behavior to the member with key `name(params)`.
    pub fn add_member_behavior(
        &mut self,
        member_key: impl Into<String>,
        behavior: MemberBehavior,
    ) -> &mut Self {
        let _ = self.member_behaviors.insert(member_key.into(), behavior);
        self
    }

    /// Behavior attached to `member`, if any.
    pub fn member_behavior(&self, member: &MemberDescriptor) -> Option<&MemberBehavior> {
        self.member_behaviors.get(&member.member_key())
    }

    /// All member behaviors keyed by member key.
    pub fn member_behaviors(&self) -> &BTreeMap<String, MemberBehavior> {
        &self.member_behaviors
    }

    /// Construction behavior.
    pub fn construction(&self) -> ConstructionBehavior {
        self.construction
    }

    /// Set the construction behavior.
    pub fn set_construction(&mut self, behavior: ConstructionBehavior) -> &mut Self {
        self.construction = behavior;
        self
    }

    /// On-load override; `None` defers to the matching include rule.
    pub fn on_load(&self) -> Option<&OnLoad> {
        self.on_load.as_ref()
    }

    /// Override the on-load action.
    pub fn set_on_load(&mut self, on_load: OnLoad) -> &mut Self {
        self.on_load = Some(on_load);
        self
    }

    /// Hook run before a shared instance is created.
    pub fn pre_create_method(&self) -> Option<&str> {
        self.pre_create_method.as_deref()
    }

    /// Set the pre-create hook.
    pub fn set_pre_create_method(&mut self, method: impl Into<String>) -> &mut Self {
        self.pre_create_method = Some(method.into());
        self
    }

    /// Hook run after a shared instance is created.
    pub fn post_create_method(&self) -> Option<&str> {
        self.post_create_method.as_deref()
    }

    /// Set the post-create hook.
    pub fn set_post_create_method(&mut self, method: impl Into<String>) -> &mut Self {
        self.post_create_method = Some(method.into());
        self
    }

    /// Whether a precomputed artifact already satisfies this type.
    pub fn is_pre_instrumented(&self) -> bool {
        self.pre_instrumented
    }

    /// Mark as satisfied by a precomputed artifact.
    pub fn mark_pre_instrumented(&mut self) -> &mut Self {
        self.pre_instrumented = true;
        self
    }

    /// Whether presence in the inventory depends on the runtime version.
    pub fn is_version_specific(&self) -> bool {
        self.version_specific
    }

    /// Set the version-specific flag.
    pub fn set_version_specific(&mut self, version_specific: bool) -> &mut Self {
        self.version_specific = version_specific;
        self
    }

    /// Honor-transient override.
    pub fn honor_transient(&self) -> Option<bool> {
        self.honor_transient
    }

    /// Override whether declared `transient` fields are skipped.
    pub fn set_honor_transient(&mut self, honor: bool) -> &mut Self {
        self.honor_transient = Some(honor);
        self
    }

    /// Honor-volatile override.
    pub fn honor_volatile(&self) -> Option<bool> {
        self.honor_volatile
    }

    /// Override whether `volatile` semantics are kept.
    pub fn set_honor_volatile(&mut self, honor: bool) -> &mut Self {
        self.honor_volatile = Some(honor);
        self
    }

    /// Exclude a method (by name) from instrumentation.
    pub fn add_do_not_instrument(&mut self, method: impl Into<String>) -> &mut Self {
        let _ = self.excluded_methods.insert(method.into());
        self
    }

    /// Whether the method is excluded from instrumentation.
    pub fn do_not_instrument(&self, method: &str) -> bool {
        self.excluded_methods.contains(method)
    }

    /// Spec-level custom rewriter id.
    pub fn custom_rewriter(&self) -> Option<&str> {
        self.custom_rewriter.as_deref()
    }

    /// Set the spec-level custom rewriter.
    pub fn set_custom_rewriter(&mut self, id: impl Into<String>) -> &mut Self {
        self.custom_rewriter = Some(id.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
