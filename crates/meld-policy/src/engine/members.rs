//! Member- and field-level policy: locks, distributed methods, transient
//! fields, and on-load behavior.

use std::sync::Arc;

use meld_core::{MemberDescriptor, Modifiers, TypeDescriptor, TypeName};
use tracing::debug;

use super::PolicyEngine;
use crate::decision::{field_is_transient, honors_transient, honors_volatile, resolve_on_load};
use crate::errors::{PolicyError, Result};
use crate::locks::{LockDefinition, LockLevel};
use crate::members::DistributedMethodSpec;
use crate::rules::{Disposition, IncludeRule, OnLoad};
use crate::spec::ClassSpec;

impl PolicyEngine {
    // ── Locks ───────────────────────────────────────────────────────

    /// Apply `definition` to members matching `pattern`.
    ///
    /// # Panics
    ///
    /// If the definition is not committed.
    pub fn add_lock(&self, pattern: impl Into<String>, definition: Arc<LockDefinition>) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, lock = %definition, "Lock registered");
        self.locks.write().add_lock(pattern, definition);
    }

    /// Autolock members matching `pattern` at `level`.
    pub fn add_autolock(&self, pattern: impl Into<String>, level: LockLevel, provenance: Option<&str>) {
        self.add_lock(pattern, LockDefinition::committed_autolock(level, provenance));
    }

    /// Write autolock.
    pub fn add_write_autolock(&self, pattern: impl Into<String>) {
        self.add_autolock(pattern, LockLevel::Write, None);
    }

    /// Read autolock.
    pub fn add_read_autolock(&self, pattern: impl Into<String>) {
        self.add_autolock(pattern, LockLevel::Read, None);
    }

    /// Synchronous-write autolock.
    pub fn add_synchronous_write_autolock(&self, pattern: impl Into<String>) {
        self.add_autolock(pattern, LockLevel::SynchronousWrite, None);
    }

    /// Read autolock applied even to unsynchronized members.
    pub fn add_auto_synchronize_read(&self, pattern: impl Into<String>) {
        self.add_autolock(pattern, LockLevel::AutoSynchronizedRead, None);
    }

    /// Write autolock applied even to unsynchronized members.
    pub fn add_auto_synchronize_write(&self, pattern: impl Into<String>) {
        self.add_autolock(pattern, LockLevel::AutoSynchronizedWrite, None);
    }

    /// Suppress autolocks on members matching `pattern`.
    pub fn add_autolock_exclude(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, "Autolock exclusion registered");
        self.locks.write().add_autolock_exclude(pattern);
    }

    /// Lock definitions applying to `member`: every matching named lock and
    /// at most one autolock.
    pub fn lock_definitions_for(&self, member: &MemberDescriptor) -> Result<Vec<Arc<LockDefinition>>> {
        Ok(self.locks.read().lock_definitions_for(self.matcher(), member)?)
    }

    /// Whether `member` is rewritten with a lock.
    pub fn is_lock_method(&self, member: &MemberDescriptor) -> Result<bool> {
        Ok(self.locks.read().is_lock_method(self.matcher(), member)?)
    }

    /// The autolock applying to `member`, if any.
    pub fn autolock_definition_for(
        &self,
        member: &MemberDescriptor,
    ) -> Result<Option<Arc<LockDefinition>>> {
        Ok(self.locks.read().autolock_definition_for(self.matcher(), member)?)
    }

    // ── Distributed methods ─────────────────────────────────────────

    /// Replay calls to matching members on other nodes.
    pub fn add_distributed_method(&self, spec: DistributedMethodSpec) {
        debug!(
            pattern = %spec.method_expression,
            run_on_all_nodes = spec.run_on_all_nodes,
            "Distributed method registered"
        );
        self.distributed.write().add(spec);
    }

    /// The distributed registration applying to `member`.
    pub fn distributed_method_for(
        &self,
        member: &MemberDescriptor,
    ) -> Result<Option<DistributedMethodSpec>> {
        Ok(self.distributed.read().lookup(self.matcher(), member)?)
    }

    // ── Fields ──────────────────────────────────────────────────────

    /// Keep `type_name.field` out of the shared graph.
    pub fn add_transient(&self, type_name: &str, field: &str) -> Result<()> {
        if type_name.is_empty() || field.is_empty() {
            return Err(PolicyError::InvalidFieldName {
                name: format!("{type_name}.{field}"),
            });
        }
        let key = (TypeName::new(type_name).into_inner(), field.to_string());
        debug!(type_name = %key.0, field, "Transient field registered");
        let _ = self.transients.write().insert(key);
        Ok(())
    }

    /// Whether the field `field` of `ty`, declared with `modifiers`, is kept
    /// out of the shared graph.
    pub fn is_transient(&self, modifiers: Modifiers, ty: &TypeDescriptor, field: &str) -> Result<bool> {
        let (honor, in_spec) = self.with_type_attributes(ty, |spec, include| {
            (
                honors_transient(spec, include),
                spec.is_some_and(|spec| spec.transient_fields().contains(field)),
            )
        })?;
        let listed = in_spec
            || self
                .transients
                .read()
                .contains(&(ty.name.as_str().to_string(), field.to_string()));
        Ok(field_is_transient(field, modifiers, honor, listed))
    }

    /// Whether a field of `ty` declared with `modifiers` keeps volatile
    /// semantics.
    pub fn is_volatile(&self, modifiers: Modifiers, ty: &TypeDescriptor) -> Result<bool> {
        if !modifiers.is_volatile() {
            return Ok(false);
        }
        self.with_type_attributes(ty, honors_volatile)
    }

    pub(super) fn listed_transients(&self, type_name: &str) -> Vec<String> {
        let owner = TypeName::new(type_name).into_inner();
        self.transients
            .read()
            .range((owner.clone(), String::new())..)
            .take_while(|(t, _)| *t == owner)
            .map(|(_, field)| field.clone())
            .collect()
    }

    // ── Load and construction hooks ─────────────────────────────────

    /// On-load action for `ty`.
    pub fn on_load(&self, ty: &TypeDescriptor) -> Result<OnLoad> {
        self.with_type_attributes(ty, resolve_on_load)
    }

    /// Whether the constructor runs when a shared instance of `ty` loads.
    pub fn is_call_constructor_on_load(&self, ty: &TypeDescriptor) -> Result<bool> {
        Ok(self.on_load(ty)? == OnLoad::CallConstructor)
    }

    /// Method invoked when a shared instance of `ty` loads.
    pub fn on_load_method(&self, ty: &TypeDescriptor) -> Result<Option<String>> {
        Ok(match self.on_load(ty)? {
            OnLoad::Method(method) => Some(method),
            _ => None,
        })
    }

    /// Script run when a shared instance of `ty` loads.
    pub fn on_load_script(&self, ty: &TypeDescriptor) -> Result<Option<String>> {
        Ok(match self.on_load(ty)? {
            OnLoad::Script(script) => Some(script),
            _ => None,
        })
    }

    /// Hook run before a shared instance of `type_name` is created.
    pub fn pre_create_method(&self, type_name: &str) -> Option<String> {
        self.specs
            .read()
            .get(type_name)
            .and_then(ClassSpec::pre_create_method)
            .map(ToString::to_string)
    }

    /// Hook run after a shared instance of `type_name` is created.
    pub fn post_create_method(&self, type_name: &str) -> Option<String> {
        self.specs
            .read()
            .get(type_name)
            .and_then(ClassSpec::post_create_method)
            .map(ToString::to_string)
    }

    fn with_type_attributes<R>(
        &self,
        ty: &TypeDescriptor,
        read: impl FnOnce(Option<&ClassSpec>, Option<&IncludeRule>) -> R,
    ) -> Result<R> {
        let specs = self.specs.read();
        let rules = self.rules.read();
        let disposition = rules.resolve_disposition(self.matcher(), ty)?;
        let include = match &disposition {
            Disposition::Include(rule) => Some(rule),
            Disposition::Exclude | Disposition::NoOpinion => None,
        };
        Ok(read(specs.get(ty.name()), include))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
