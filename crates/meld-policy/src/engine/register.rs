//! Registration and lookup of rules, custom rewriters, class specs, and
//! roots.
//!
//! Every mutation that can change an adaptability decision invalidates the
//! decision cache before releasing its write lock.

use meld_core::{TypeDescriptor, TypeName};
use meld_settings::split_qualified_field;
use tracing::debug;

use super::PolicyEngine;
use crate::errors::{PolicyError, Result};
use crate::locks::{LockDefinition, LockLevel};
use crate::roots::RootDefinition;
use crate::rules::{Disposition, IncludeRule, Rule};
use crate::spec::ClassSpec;

/// Provenance recorded on autolocks added alongside an include.
const INCLUDE_AND_LOCK_PROVENANCE: &str = "added with include";

impl PolicyEngine {
    // ── Include/exclude rules ───────────────────────────────────────

    /// Include types matching `pattern`, ahead of every existing rule.
    pub fn add_include(&self, pattern: impl Into<String>, attributes: IncludeRule) {
        let pattern = pattern.into();
        let mut rules = self.rules.write();
        debug!(pattern = %pattern, "Include rule registered");
        rules.prepend(Rule::include(pattern, attributes));
        self.invalidate("include rule");
    }

    /// Include types matching `pattern` with default attributes.
    pub fn add_include_pattern(&self, pattern: impl Into<String>) {
        self.add_include(pattern, IncludeRule::default());
    }

    /// Exclude types matching `pattern`, ahead of every existing rule.
    pub fn add_exclude(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        let mut rules = self.rules.write();
        debug!(pattern = %pattern, "Exclude rule registered");
        rules.prepend(Rule::exclude(pattern));
        self.invalidate("exclude rule");
    }

    /// Register a block of rules ahead of every existing rule, keeping the
    /// block's order: its first rule becomes the first one consulted.
    pub fn add_rules_in_order(&self, block: Vec<Rule>) {
        if block.is_empty() {
            return;
        }
        let count = block.len();
        let mut rules = self.rules.write();
        rules.prepend_block(block);
        debug!(count, "Rule block registered");
        self.invalidate("rule block");
    }

    /// Include `pattern` and register a write autolock on `lock_pattern`,
    /// but only when `ty` has no spec and no include/exclude rule matches
    /// it yet. Returns whether anything was added.
    pub fn add_include_and_lock_if_required(
        &self,
        ty: &TypeDescriptor,
        pattern: impl Into<String>,
        attributes: IncludeRule,
        lock_pattern: impl Into<String>,
    ) -> Result<bool> {
        let specs = self.specs.read();
        let mut rules = self.rules.write();
        if specs.contains(ty.name())
            || rules.resolve_disposition(self.matcher(), ty)? != Disposition::NoOpinion
        {
            return Ok(false);
        }

        let pattern = pattern.into();
        let lock_pattern = lock_pattern.into();
        debug!(
            type_name = %ty.name,
            pattern = %pattern,
            lock_pattern = %lock_pattern,
            "Include and autolock registered"
        );
        rules.prepend(Rule::include(pattern, attributes));
        self.locks.write().add_lock(
            lock_pattern,
            LockDefinition::committed_autolock(LockLevel::Write, Some(INCLUDE_AND_LOCK_PROVENANCE)),
        );
        self.invalidate("include and lock");
        Ok(true)
    }

    /// Never transform types matching `pattern`, whatever else applies.
    pub fn add_permanent_exclude(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        let mut rules = self.rules.write();
        debug!(pattern = %pattern, "Permanent exclude registered");
        rules.add_permanent_exclude(pattern);
        self.invalidate("permanent exclude");
    }

    /// Mark types matching `pattern` as unsafe to share.
    pub fn add_non_portable(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        let mut rules = self.rules.write();
        debug!(pattern = %pattern, "Non-portable rule registered");
        rules.add_non_portable(pattern);
        self.invalidate("non-portable rule");
    }

    /// Allow or refuse dynamically generated proxy subtypes.
    pub fn set_allow_dynamic_subtypes(&self, allow: bool) {
        let mut rules = self.rules.write();
        if rules.allows_dynamic_subtypes() == allow {
            return;
        }
        rules.set_allow_dynamic_subtypes(allow);
        debug!(allow, "Dynamic subtype support changed");
        self.invalidate("dynamic subtypes");
    }

    // ── Custom rewriters ────────────────────────────────────────────

    /// Route `type_name` through the rewriter `rewriter_id`.
    pub fn add_custom_rewriter(&self, type_name: &str, rewriter_id: impl Into<String>) {
        let name = TypeName::new(type_name);
        let rewriter_id = rewriter_id.into();
        let mut rewriters = self.rewriters.write();
        debug!(type_name = %name, rewriter = %rewriter_id, "Custom rewriter registered");
        let _ = rewriters.insert(name, rewriter_id);
        self.invalidate("custom rewriter");
    }

    /// Drop the custom rewriter for `type_name`, returning its id.
    pub fn remove_custom_rewriter(&self, type_name: &str) -> Option<String> {
        let mut rewriters = self.rewriters.write();
        let removed = rewriters.remove(&TypeName::new(type_name));
        if removed.is_some() {
            self.invalidate("custom rewriter removed");
        }
        removed
    }

    /// Whether a custom rewriter is registered for `type_name`.
    pub fn has_custom_rewriter(&self, type_name: &str) -> bool {
        self.rewriters.read().contains_key(&TypeName::new(type_name))
    }

    /// Id of the custom rewriter registered for `type_name`.
    pub fn custom_rewriter_for(&self, type_name: &str) -> Option<String> {
        self.rewriters.read().get(&TypeName::new(type_name)).cloned()
    }

    // ── Class specs ─────────────────────────────────────────────────

    /// Register a live spec.
    ///
    /// # Panics
    ///
    /// If the type already has a spec.
    pub fn add_spec(&self, spec: ClassSpec) {
        let mut specs = self.specs.write();
        debug!(type_name = %spec.name(), "Class spec registered");
        specs.insert(spec);
        self.invalidate("class spec");
    }

    /// Register a spec in the inventory partition.
    ///
    /// # Panics
    ///
    /// If the type already has a spec.
    pub fn add_inventory_spec(&self, spec: ClassSpec) {
        let mut specs = self.specs.write();
        specs.insert_inventory(spec);
        self.invalidate("inventory spec");
    }

    /// Register a live spec unless the type already has one in either
    /// partition. Returns whether `spec` was inserted.
    pub fn add_spec_if_absent(&self, spec: ClassSpec) -> bool {
        let mut specs = self.specs.write();
        if specs.contains(spec.name()) {
            return false;
        }
        debug!(type_name = %spec.name(), "Class spec registered");
        specs.insert(spec);
        self.invalidate("class spec");
        true
    }

    /// Register an inventory spec unless the type already has one in either
    /// partition. Returns whether `spec` was inserted.
    pub fn add_inventory_spec_if_absent(&self, spec: ClassSpec) -> bool {
        let mut specs = self.specs.write();
        if specs.contains(spec.name()) {
            return false;
        }
        specs.insert_inventory(spec);
        self.invalidate("inventory spec");
        true
    }

    /// The spec for `type_name`, creating an empty live one if needed.
    pub fn get_or_create_spec(&self, type_name: &str) -> ClassSpec {
        self.get_or_create_with(type_name, || ClassSpec::new(type_name))
    }

    /// The spec for `type_name`, creating a logical one driven by
    /// `change_applicator` if needed. An existing spec is returned as is.
    pub fn get_or_create_logical_spec(&self, type_name: &str, change_applicator: &str) -> ClassSpec {
        self.get_or_create_with(type_name, || {
            ClassSpec::logical(type_name, change_applicator)
        })
    }

    fn get_or_create_with(&self, type_name: &str, create: impl FnOnce() -> ClassSpec) -> ClassSpec {
        let mut specs = self.specs.write();
        if let Some(existing) = specs.get(type_name) {
            return existing.clone();
        }
        let spec = specs.get_or_insert_with(type_name, create).clone();
        debug!(type_name = %spec.name(), "Class spec created");
        self.invalidate("class spec");
        spec
    }

    /// Mutate the spec for `type_name`, creating it if needed.
    pub fn update_spec<R>(&self, type_name: &str, update: impl FnOnce(&mut ClassSpec) -> R) -> R {
        let mut specs = self.specs.write();
        let result = update(specs.get_or_insert_with(type_name, || ClassSpec::new(type_name)));
        self.invalidate("class spec updated");
        result
    }

    /// Make `type_name` logical under the logical type `super_type`.
    pub fn move_to_logical(&self, type_name: &str, super_type: &str) -> Result<()> {
        let mut specs = self.specs.write();
        let super_spec = specs
            .get(super_type)
            .cloned()
            .ok_or_else(|| PolicyError::InvalidArgument {
                message: format!("no class spec for {super_type}"),
            })?;
        let _ = specs
            .get_or_insert_with(type_name, || ClassSpec::new(type_name))
            .move_to_logical(&super_spec)?;
        self.invalidate("logical spec");
        Ok(())
    }

    /// Copy of the spec for `type_name`.
    pub fn spec(&self, type_name: &str) -> Option<ClassSpec> {
        self.specs.read().get(type_name).cloned()
    }

    /// Whether `type_name` has a spec in either partition.
    pub fn has_spec(&self, type_name: &str) -> bool {
        self.specs.read().contains(type_name)
    }

    /// Remove the spec for `type_name` from both partitions.
    pub fn remove_spec(&self, type_name: &str) -> Option<ClassSpec> {
        let mut specs = self.specs.write();
        let removed = specs.remove(type_name);
        if removed.is_some() {
            debug!(type_name, "Class spec removed");
            self.invalidate("class spec removed");
        }
        removed
    }

    /// Copies of every live spec, plus inventory specs when asked, sorted
    /// by type name.
    pub fn all_specs(&self, include_inventory: bool) -> Vec<ClassSpec> {
        self.specs
            .read()
            .all(include_inventory)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Mark every live spec as shipping already instrumented.
    pub fn mark_all_specs_pre_instrumented(&self) {
        let mut specs = self.specs.write();
        specs.mark_all_pre_instrumented();
        debug!(count = specs.live_len(), "Live class specs marked pre-instrumented");
    }

    /// Whether `type_name` has a logical spec.
    pub fn is_logical(&self, type_name: &str) -> bool {
        self.specs
            .read()
            .get(type_name)
            .is_some_and(ClassSpec::is_logical)
    }

    /// The logical type `type_name` was moved under, if any.
    pub fn logical_extending_type(&self, type_name: &str) -> Option<TypeName> {
        self.specs
            .read()
            .get(type_name)
            .and_then(ClassSpec::logical_extending_type)
            .cloned()
    }

    /// Change applicator of the logical type `type_name`.
    pub fn change_applicator_for(&self, type_name: &str) -> Option<String> {
        self.specs
            .read()
            .get(type_name)
            .and_then(ClassSpec::change_applicator)
            .map(ToString::to_string)
    }

    // ── Roots ───────────────────────────────────────────────────────

    /// Register a root, optionally creating a spec for its declaring type.
    pub fn add_root(&self, root: RootDefinition, create_spec: bool) -> Result<()> {
        let mut specs = self.specs.write();
        let mut roots = self.roots.write();
        let type_name = root.type_name.clone();
        let field = root.field_name.clone();
        roots.add(root)?;
        if create_spec {
            let _ = specs.get_or_insert_with(&type_name, || ClassSpec::new(type_name.clone()));
        }
        debug!(type_name = %type_name, field = %field, "Root registered");
        self.invalidate("root");
        Ok(())
    }

    /// Register the root `pkg.Type.field`, exposed as `root_name` when given.
    pub fn add_root_for_field(&self, qualified_field: &str, root_name: Option<&str>) -> Result<()> {
        let (type_name, field) =
            split_qualified_field(qualified_field).map_err(|_| PolicyError::InvalidFieldName {
                name: qualified_field.to_string(),
            })?;
        let mut root = RootDefinition::new(type_name, field);
        if let Some(name) = root_name {
            root = root.named(name);
        }
        self.add_root(root, false)
    }

    /// Whether `type_name.field` is a root.
    pub fn is_root(&self, type_name: &str, field: &str) -> bool {
        self.roots.read().is_root(type_name, field)
    }

    /// Copy of the root definition for `type_name.field`.
    pub fn root_for(&self, type_name: &str, field: &str) -> Option<RootDefinition> {
        self.roots.read().get(type_name, field).cloned()
    }

    /// Exposed name of a root.
    ///
    /// # Panics
    ///
    /// If the field is not a root.
    pub fn root_name_for(&self, type_name: &str, field: &str) -> String {
        self.roots.read().root_name_for(type_name, field)
    }

    /// Finality of a root.
    ///
    /// # Panics
    ///
    /// If the field is not a root.
    pub fn is_root_final(&self, type_name: &str, field: &str, is_primitive: bool) -> bool {
        self.roots.read().is_root_final(type_name, field, is_primitive)
    }

    /// Roots registered for `ty` on fields the descriptor does not declare.
    pub fn missing_root_declarations(&self, ty: &TypeDescriptor) -> Vec<String> {
        self.roots.read().missing_declarations(ty)
    }

    /// Copies of every root, ordered by type then field.
    pub fn all_roots(&self) -> Vec<RootDefinition> {
        self.roots.read().all().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
