//! Adaptability decisions and the per-type decision bundle.

use std::collections::BTreeSet;
use std::sync::Arc;

use meld_core::{FieldDescriptor, MemberDescriptor, Modifiers, TypeDescriptor};
use serde::{Deserialize, Serialize};

use crate::engine::PolicyEngine;
use crate::errors::Result;
use crate::locks::LockDefinition;
use crate::members::DistributedMethodSpec;
use crate::roots::RootDefinition;
use crate::rules::{IncludeRule, OnLoad};
use crate::spec::{ClassSpec, ConstructionBehavior, MemberBehavior, TransformMode};

/// Prefix of compiler-generated references to an enclosing instance.
const OUTER_REFERENCE_PREFIX: &str = "this$";

/// Prefix of the field the rewriter adds to logical subtypes to hold their
/// delegate instance. Such fields are always shared.
pub const LOGICAL_DELEGATE_PREFIX: &str = "__delegate_meld_";

/// What settled an adaptability decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionReason {
    /// The type belongs to the engine's own runtime.
    InternalNamespace,
    /// A permanent-exclude rule matched.
    PermanentlyExcluded,
    /// Generated proxy subtype while dynamic subtypes are refused.
    DynamicSubtypeRefused,
    /// Nested in a logical type and has no spec of its own.
    NestedInLogicalType,
    /// The type declares at least one root.
    DeclaresRoot,
    /// A custom rewriter is registered for the type.
    CustomRewriter,
    /// The type has a class spec.
    ExplicitSpec,
    /// An include rule matched.
    IncludeRule,
    /// An exclude rule matched.
    ExcludeRule,
    /// No include/exclude rule matched.
    NoMatchingRule,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::InternalNamespace => "internal namespace",
            Self::PermanentlyExcluded => "permanently excluded",
            Self::DynamicSubtypeRefused => "dynamic subtype refused",
            Self::NestedInLogicalType => "nested in logical type",
            Self::DeclaresRoot => "declares root",
            Self::CustomRewriter => "custom rewriter",
            Self::ExplicitSpec => "explicit spec",
            Self::IncludeRule => "include rule",
            Self::ExcludeRule => "exclude rule",
            Self::NoMatchingRule => "no matching rule",
        })
    }
}

/// Whether a type may be transformed, and why.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptabilityDecision {
    /// The answer.
    pub transformable: bool,
    /// The step that produced it.
    pub reason: DecisionReason,
}

impl AdaptabilityDecision {
    /// Pair an answer with its reason.
    pub fn new(transformable: bool, reason: DecisionReason) -> Self {
        Self {
            transformable,
            reason,
        }
    }

    pub(crate) fn refuse(reason: DecisionReason) -> Self {
        Self::new(false, reason)
    }

    pub(crate) fn accept(reason: DecisionReason) -> Self {
        Self::new(true, reason)
    }
}

/// Honor-transient for a type: the spec override, else the include rule.
pub(crate) fn honors_transient(spec: Option<&ClassSpec>, include: Option<&IncludeRule>) -> bool {
    spec.and_then(ClassSpec::honor_transient)
        .or_else(|| include.map(|rule| rule.honor_transient))
        .unwrap_or(false)
}

/// Honor-volatile for a type: the spec override, else the include rule.
pub(crate) fn honors_volatile(spec: Option<&ClassSpec>, include: Option<&IncludeRule>) -> bool {
    spec.and_then(ClassSpec::honor_volatile)
        .or_else(|| include.map(|rule| rule.honor_volatile))
        .unwrap_or(false)
}

/// On-load action for a type: the spec's when set, else the include rule's.
pub(crate) fn resolve_on_load(spec: Option<&ClassSpec>, include: Option<&IncludeRule>) -> OnLoad {
    spec.and_then(ClassSpec::on_load)
        .or_else(|| include.map(|rule| &rule.on_load))
        .cloned()
        .unwrap_or_default()
}

/// Whether a field is excluded from the shared graph.
pub(crate) fn field_is_transient(
    field_name: &str,
    modifiers: Modifiers,
    honor_transient: bool,
    listed: bool,
) -> bool {
    if is_outer_reference(field_name) {
        return true;
    }
    if field_name.starts_with(LOGICAL_DELEGATE_PREFIX) {
        return false;
    }
    if modifiers.is_transient() && honor_transient {
        return true;
    }
    listed
}

fn is_outer_reference(field_name: &str) -> bool {
    field_name
        .strip_prefix(OUTER_REFERENCE_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Everything the rewriter needs to know about one type.
///
/// Type-level facts are captured when the bundle is built. Member-level
/// queries (`lock_definitions_for`, `is_lock_method`,
/// `distributed_method_for`) go back to the engine and see registrations
/// made afterwards.
pub struct ClassDecision<'a> {
    engine: &'a PolicyEngine,
    ty: &'a TypeDescriptor,
    adaptability: AdaptabilityDecision,
    mode: TransformMode,
    spec: Option<ClassSpec>,
    include: Option<IncludeRule>,
    transients: BTreeSet<String>,
    roots: Vec<RootDefinition>,
    custom_rewriter: Option<String>,
}

pub(crate) struct DecisionParts {
    pub adaptability: AdaptabilityDecision,
    pub mode: TransformMode,
    pub spec: Option<ClassSpec>,
    pub include: Option<IncludeRule>,
    pub transients: BTreeSet<String>,
    pub roots: Vec<RootDefinition>,
    pub custom_rewriter: Option<String>,
}

impl<'a> ClassDecision<'a> {
    pub(crate) fn new(engine: &'a PolicyEngine, ty: &'a TypeDescriptor, parts: DecisionParts) -> Self {
        Self {
            engine,
            ty,
            adaptability: parts.adaptability,
            mode: parts.mode,
            spec: parts.spec,
            include: parts.include,
            transients: parts.transients,
            roots: parts.roots,
            custom_rewriter: parts.custom_rewriter,
        }
    }

    /// The type this bundle describes.
    pub fn type_descriptor(&self) -> &TypeDescriptor {
        self.ty
    }

    /// Whether the type may be transformed.
    pub fn transformable(&self) -> bool {
        self.adaptability.transformable
    }

    /// Why.
    pub fn reason(&self) -> DecisionReason {
        self.adaptability.reason
    }

    /// Transformation mode.
    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    /// The type's own spec, as of when the bundle was built.
    pub fn spec(&self) -> Option<&ClassSpec> {
        self.spec.as_ref()
    }

    /// Whether a hand-written substitute handles the type.
    pub fn is_logical(&self) -> bool {
        self.spec.as_ref().is_some_and(ClassSpec::is_logical)
    }

    /// Change applicator for logical types.
    pub fn change_applicator(&self) -> Option<&str> {
        self.spec.as_ref().and_then(ClassSpec::change_applicator)
    }

    /// Names of fields kept out of the shared graph by explicit listing.
    pub fn transient_fields(&self) -> &BTreeSet<String> {
        &self.transients
    }

    /// Which constructor runs when an instance is created locally.
    pub fn construction_behavior(&self) -> ConstructionBehavior {
        self.spec
            .as_ref()
            .map_or(ConstructionBehavior::DefaultConstructor, ClassSpec::construction)
    }

    /// On-load action.
    pub fn on_load(&self) -> OnLoad {
        resolve_on_load(self.spec.as_ref(), self.include.as_ref())
    }

    /// Whether the constructor runs when a shared instance is loaded.
    pub fn is_call_constructor_on_load(&self) -> bool {
        self.on_load() == OnLoad::CallConstructor
    }

    /// Hook run before a shared instance is created.
    pub fn pre_create_method(&self) -> Option<&str> {
        self.spec.as_ref().and_then(ClassSpec::pre_create_method)
    }

    /// Hook run after a shared instance is created.
    pub fn post_create_method(&self) -> Option<&str> {
        self.spec.as_ref().and_then(ClassSpec::post_create_method)
    }

    /// Whether the type ships already instrumented.
    pub fn is_pre_instrumented(&self) -> bool {
        self.spec.as_ref().is_some_and(ClassSpec::is_pre_instrumented)
    }

    /// Custom rewriter id: the registry's, else the spec's.
    pub fn custom_rewriter(&self) -> Option<&str> {
        self.custom_rewriter
            .as_deref()
            .or_else(|| self.spec.as_ref().and_then(ClassSpec::custom_rewriter))
    }

    /// Root declared on `field`, if any.
    pub fn root_for(&self, field: &str) -> Option<&RootDefinition> {
        self.roots.iter().find(|root| root.field_name == field)
    }

    /// Roots the type declares.
    pub fn roots(&self) -> &[RootDefinition] {
        &self.roots
    }

    /// Whether `field` is kept out of the shared graph.
    pub fn is_transient(&self, field: &FieldDescriptor) -> bool {
        field_is_transient(
            &field.name,
            field.modifiers,
            honors_transient(self.spec.as_ref(), self.include.as_ref()),
            self.transients.contains(&field.name),
        )
    }

    /// Whether `field` keeps volatile semantics.
    pub fn is_volatile(&self, field: &FieldDescriptor) -> bool {
        field.modifiers.is_volatile() && honors_volatile(self.spec.as_ref(), self.include.as_ref())
    }

    /// Custom behavior for `member`.
    pub fn member_behavior(&self, member: &MemberDescriptor) -> Option<&MemberBehavior> {
        self.spec.as_ref().and_then(|spec| spec.member_behavior(member))
    }

    /// Whether `member` is left uninstrumented.
    pub fn do_not_instrument(&self, member: &MemberDescriptor) -> bool {
        self.spec
            .as_ref()
            .is_some_and(|spec| spec.do_not_instrument(&member.name))
    }

    /// Lock definitions applying to `member`.
    pub fn lock_definitions_for(&self, member: &MemberDescriptor) -> Result<Vec<Arc<LockDefinition>>> {
        self.engine.lock_definitions_for(member)
    }

    /// Whether `member` is rewritten with a lock.
    pub fn is_lock_method(&self, member: &MemberDescriptor) -> Result<bool> {
        self.engine.is_lock_method(member)
    }

    /// Distributed registration applying to `member`.
    pub fn distributed_method_for(
        &self,
        member: &MemberDescriptor,
    ) -> Result<Option<DistributedMethodSpec>> {
        self.engine.distributed_method_for(member)
    }
}

impl std::fmt::Debug for ClassDecision<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDecision")
            .field("type", &self.ty.name)
            .field("transformable", &self.adaptability.transformable)
            .field("reason", &self.adaptability.reason)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
