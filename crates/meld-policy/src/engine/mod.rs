//! The policy engine.
//!
//! [`PolicyEngine`] owns every registry and answers the questions the class
//! loader asks at load time. It is an explicitly constructed context object;
//! share it as `Arc<PolicyEngine>`.
//!
//! Each store sits behind its own `RwLock`. Operations that read several
//! stores take a [`Snapshot`] of read guards once, so the answer reflects one
//! consistent state and no lock is acquired twice on the same thread. When
//! more than one lock is held they are always taken in this order:
//! specs, rules, roots, rewriters, locks, distributed, transients.
//!
//! Adaptability decisions and modes are memoized per type name. A type name
//! is assumed to identify one descriptor for the lifetime of the engine.

mod members;
mod register;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use meld_core::{TypeDescriptor, TypeName, outer_type_name};
use meld_settings::DEFAULT_INTERNAL_NAMESPACES;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, error, trace};

use crate::cache::DecisionCache;
use crate::decision::{AdaptabilityDecision, ClassDecision, DecisionParts, DecisionReason};
use crate::errors::Result;
use crate::inventory::{self, InventoryManifest, InventoryReport};
use crate::locks::LockPolicy;
use crate::matcher::{ExpressionMatcher, PatternError, PatternMatcher};
use crate::members::DistributedMethods;
use crate::mode::{self, ModeFacts};
use crate::roots::RootRegistry;
use crate::rules::{Disposition, RuleRegistry};
use crate::spec::{ClassSpec, TransformMode};
use crate::spec_store::SpecStore;

/// Construction options.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Name prefixes reserved for the engine's own runtime.
    pub internal_namespaces: Vec<String>,
    /// Transform dynamically generated proxy subtypes.
    pub allow_dynamic_subtypes: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            internal_namespaces: DEFAULT_INTERNAL_NAMESPACES
                .iter()
                .map(ToString::to_string)
                .collect(),
            allow_dynamic_subtypes: false,
        }
    }
}

/// Registries plus the decision cache.
pub struct PolicyEngine {
    matcher: Arc<dyn PatternMatcher>,
    specs: RwLock<SpecStore>,
    rules: RwLock<RuleRegistry>,
    roots: RwLock<RootRegistry>,
    rewriters: RwLock<HashMap<TypeName, String>>,
    locks: RwLock<LockPolicy>,
    distributed: RwLock<DistributedMethods>,
    transients: RwLock<BTreeSet<(String, String)>>,
    cache: DecisionCache,
}

impl PolicyEngine {
    /// Empty engine using `matcher` with default options.
    pub fn new(matcher: Arc<dyn PatternMatcher>) -> Self {
        Self::with_options(matcher, EngineOptions::default())
    }

    /// Empty engine using `matcher`.
    pub fn with_options(matcher: Arc<dyn PatternMatcher>, options: EngineOptions) -> Self {
        let mut rules = RuleRegistry::new(options.internal_namespaces);
        rules.set_allow_dynamic_subtypes(options.allow_dynamic_subtypes);
        Self {
            matcher,
            specs: RwLock::new(SpecStore::new()),
            rules: RwLock::new(rules),
            roots: RwLock::new(RootRegistry::new()),
            rewriters: RwLock::new(HashMap::new()),
            locks: RwLock::new(LockPolicy::new()),
            distributed: RwLock::new(DistributedMethods::new()),
            transients: RwLock::new(BTreeSet::new()),
            cache: DecisionCache::new(),
        }
    }

    /// The pattern matcher every rule is evaluated with.
    pub fn matcher(&self) -> &dyn PatternMatcher {
        self.matcher.as_ref()
    }

    /// Current cache generation. Moves on every registration that can
    /// change a decision.
    pub fn cache_generation(&self) -> u64 {
        self.cache.generation()
    }

    /// Number of memoized decisions.
    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }

    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            matcher: self.matcher.as_ref(),
            specs: self.specs.read(),
            rules: self.rules.read(),
            roots: self.roots.read(),
            rewriters: self.rewriters.read(),
        }
    }

    /// Drop every memoized decision. Call while holding the write lock of
    /// the store that changed.
    fn invalidate(&self, cause: &'static str) {
        self.cache.invalidate();
        trace!(cause, generation = self.cache.generation(), "Decision cache invalidated");
    }

    // ── Decisions ───────────────────────────────────────────────────

    /// Whether `ty` may be transformed.
    pub fn is_transformable(&self, ty: &TypeDescriptor) -> Result<bool> {
        Ok(self.explain(ty)?.transformable)
    }

    /// Whether `ty` may be transformed, and which step decided it.
    pub fn explain(&self, ty: &TypeDescriptor) -> Result<AdaptabilityDecision> {
        let generation = self.cache.generation();
        if let Some(decision) = self.cache.decision(&ty.name, generation) {
            return Ok(decision);
        }
        let snapshot = self.snapshot();
        self.explain_in(&snapshot, ty, generation)
    }

    /// Transformation mode for `ty`.
    pub fn mode_for(&self, ty: &TypeDescriptor) -> Result<TransformMode> {
        let generation = self.cache.generation();
        if let Some(mode) = self.cache.mode(&ty.name, generation) {
            return Ok(mode);
        }
        let snapshot = self.snapshot();
        let decision = self.explain_in(&snapshot, ty, generation)?;
        self.mode_in(&snapshot, ty, generation, decision.transformable)
    }

    /// Everything the rewriter needs to know about `ty`.
    pub fn decide<'a>(&'a self, ty: &'a TypeDescriptor) -> Result<ClassDecision<'a>> {
        let generation = self.cache.generation();
        let snapshot = self.snapshot();
        let adaptability = self.explain_in(&snapshot, ty, generation)?;
        let mode = self.mode_in(&snapshot, ty, generation, adaptability.transformable)?;
        let include = match snapshot.rules.resolve_disposition(snapshot.matcher, ty)? {
            Disposition::Include(rule) => Some(rule),
            Disposition::Exclude | Disposition::NoOpinion => None,
        };
        let spec = snapshot.specs.get(ty.name()).cloned();
        let roots = snapshot.roots.roots_for(ty.name()).cloned().collect();
        let custom_rewriter = snapshot.rewriters.get(&ty.name).cloned();

        let mut transients = spec
            .as_ref()
            .map(|spec| spec.transient_fields().clone())
            .unwrap_or_default();
        transients.extend(self.listed_transients(ty.name()));
        drop(snapshot);

        Ok(ClassDecision::new(
            self,
            ty,
            DecisionParts {
                adaptability,
                mode,
                spec,
                include,
                transients,
                roots,
                custom_rewriter,
            },
        ))
    }

    fn explain_in(
        &self,
        snapshot: &Snapshot<'_>,
        ty: &TypeDescriptor,
        generation: u64,
    ) -> Result<AdaptabilityDecision> {
        if let Some(decision) = self.cache.decision(&ty.name, generation) {
            return Ok(decision);
        }
        let decision = snapshot.adaptability(ty)?;
        self.cache.store_decision(&ty.name, generation, decision);
        trace!(
            type_name = %ty.name,
            transformable = decision.transformable,
            reason = %decision.reason,
            "Adaptability decided"
        );
        Ok(decision)
    }

    fn mode_in(
        &self,
        snapshot: &Snapshot<'_>,
        ty: &TypeDescriptor,
        generation: u64,
        transformable: bool,
    ) -> Result<TransformMode> {
        if let Some(mode) = self.cache.mode(&ty.name, generation) {
            return Ok(mode);
        }
        let mode = mode::decide(ty, transformable, snapshot)?;
        self.cache.store_mode(&ty.name, generation, mode);
        Ok(mode)
    }

    // ── Rule queries ────────────────────────────────────────────────

    /// First matching include/exclude rule for `ty`.
    pub fn resolve_disposition(&self, ty: &TypeDescriptor) -> Result<Disposition> {
        Ok(self.rules.read().resolve_disposition(self.matcher(), ty)?)
    }

    /// Whether any include/exclude rule is registered.
    pub fn has_include_exclude_rules(&self) -> bool {
        self.rules.read().has_include_exclude_rules()
    }

    /// Whether some include/exclude rule matches `ty`.
    pub fn has_include_exclude_rule_for(&self, ty: &TypeDescriptor) -> Result<bool> {
        Ok(self.resolve_disposition(ty)? != Disposition::NoOpinion)
    }

    /// Whether a non-portable rule matches `ty`.
    pub fn is_non_portable(&self, ty: &TypeDescriptor) -> Result<bool> {
        Ok(self.rules.read().is_non_portable(self.matcher(), ty)?)
    }

    /// Whether `ty` can never be shared: internal, permanently excluded, or
    /// non-portable.
    pub fn is_never_adaptable(&self, ty: &TypeDescriptor) -> Result<bool> {
        let rules = self.rules.read();
        Ok(rules.is_internal(ty.name())
            || rules.is_permanently_excluded(self.matcher(), ty)?
            || rules.is_non_portable(self.matcher(), ty)?)
    }

    /// Whether dynamically generated proxy subtypes may be transformed.
    pub fn allows_dynamic_subtypes(&self) -> bool {
        self.rules.read().allows_dynamic_subtypes()
    }

    // ── Inventory ───────────────────────────────────────────────────

    /// Compare pre-instrumented specs with the inventory manifest.
    pub fn verify_inventory(&self, manifest: &InventoryManifest) -> InventoryReport {
        let specs = self.specs.read();
        let report = inventory::verify(&specs, manifest);
        debug!(
            expected = report.expected,
            population = report.population,
            missing = report.missing_count(),
            "Inventory verified"
        );
        report
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionMatcher::new()))
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("generation", &self.cache.generation())
            .field("cached_decisions", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Read guards over every store an adaptability or mode decision reads.
struct Snapshot<'a> {
    matcher: &'a dyn PatternMatcher,
    specs: RwLockReadGuard<'a, SpecStore>,
    rules: RwLockReadGuard<'a, RuleRegistry>,
    roots: RwLockReadGuard<'a, RootRegistry>,
    rewriters: RwLockReadGuard<'a, HashMap<TypeName, String>>,
}

impl Snapshot<'_> {
    fn adaptability(&self, ty: &TypeDescriptor) -> std::result::Result<AdaptabilityDecision, PatternError> {
        let name = ty.name();

        if self.rules.is_internal(name) {
            return Ok(AdaptabilityDecision::refuse(DecisionReason::InternalNamespace));
        }
        if self.rules.is_permanently_excluded(self.matcher, ty)? {
            return Ok(AdaptabilityDecision::refuse(DecisionReason::PermanentlyExcluded));
        }
        if ty.is_dynamic_subtype() && !self.rules.allows_dynamic_subtypes() {
            error!(
                type_name = name,
                "Refusing to transform dynamically generated subtype; enable allowDynamicSubtypes to share it"
            );
            return Ok(AdaptabilityDecision::refuse(DecisionReason::DynamicSubtypeRefused));
        }

        let outer = outer_type_name(name);
        if outer != name
            && !self.specs.contains(name)
            && self.specs.get(outer).is_some_and(ClassSpec::is_logical)
        {
            return Ok(AdaptabilityDecision::refuse(DecisionReason::NestedInLogicalType));
        }

        if self.roots.has_roots(name) {
            return Ok(AdaptabilityDecision::accept(DecisionReason::DeclaresRoot));
        }
        if self.rewriters.contains_key(&ty.name) {
            return Ok(AdaptabilityDecision::accept(DecisionReason::CustomRewriter));
        }
        if self.specs.contains(name) {
            return Ok(AdaptabilityDecision::accept(DecisionReason::ExplicitSpec));
        }

        Ok(match self.rules.resolve_disposition(self.matcher, ty)? {
            Disposition::Include(_) => AdaptabilityDecision::accept(DecisionReason::IncludeRule),
            Disposition::Exclude => AdaptabilityDecision::refuse(DecisionReason::ExcludeRule),
            Disposition::NoOpinion => AdaptabilityDecision::refuse(DecisionReason::NoMatchingRule),
        })
    }
}

impl ModeFacts for Snapshot<'_> {
    fn explicit_mode(&self, type_name: &str) -> TransformMode {
        self.specs
            .get(type_name)
            .map_or(TransformMode::Unset, ClassSpec::mode)
    }

    fn is_logical(&self, type_name: &str) -> bool {
        self.specs.get(type_name).is_some_and(ClassSpec::is_logical)
    }

    fn is_included(&self, ty: &TypeDescriptor) -> std::result::Result<bool, PatternError> {
        Ok(self.rules.resolve_disposition(self.matcher, ty)?.is_include())
    }

    fn is_non_portable(&self, ty: &TypeDescriptor) -> std::result::Result<bool, PatternError> {
        self.rules.is_non_portable(self.matcher, ty)
    }
}
