//! Class specification store.
//!
//! Two partitions: specs registered at runtime ("live") and specs belonging
//! to the precomputed inventory. A type may have a spec in at most one of
//! them. The store itself is not synchronized; the engine guards both
//! partitions with a single lock so "exists in either partition" is atomic.

use std::collections::HashMap;

use meld_core::TypeName;

use crate::spec::ClassSpec;

/// Live and inventory spec partitions.
#[derive(Debug, Default)]
pub struct SpecStore {
    live: HashMap<TypeName, ClassSpec>,
    inventory: HashMap<TypeName, ClassSpec>,
}

/// Which partition a spec lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partition {
    /// Registered at runtime.
    Live,
    /// Part of the precomputed inventory.
    Inventory,
}

impl SpecStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec for `name` from either partition.
    ///
    /// # Panics
    ///
    /// If the type has a spec in both partitions.
    pub fn get(&self, name: &str) -> Option<&ClassSpec> {
        let key = TypeName::new(name);
        match self.live.get(&key) {
            Some(spec) => {
                assert!(
                    !self.inventory.contains_key(&key),
                    "class spec for {key} present in both live and inventory partitions"
                );
                Some(spec)
            }
            None => self.inventory.get(&key),
        }
    }

    /// Mutable spec for `name` from either partition.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassSpec> {
        let key = TypeName::new(name);
        if self.live.contains_key(&key) {
            assert!(
                !self.inventory.contains_key(&key),
                "class spec for {key} present in both live and inventory partitions"
            );
            return self.live.get_mut(&key);
        }
        self.inventory.get_mut(&key)
    }

    /// Whether either partition holds a spec for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Partition holding the spec for `name`.
    pub fn partition_of(&self, name: &str) -> Option<Partition> {
        let key = TypeName::new(name);
        if self.live.contains_key(&key) {
            Some(Partition::Live)
        } else if self.inventory.contains_key(&key) {
            Some(Partition::Inventory)
        } else {
            None
        }
    }

    /// Register a live spec.
    ///
    /// # Panics
    ///
    /// If the type already has a spec in either partition.
    pub fn insert(&mut self, spec: ClassSpec) {
        self.insert_into(Partition::Live, spec);
    }

    /// Register an inventory spec.
    ///
    /// # Panics
    ///
    /// If the type already has a spec in either partition.
    pub fn insert_inventory(&mut self, spec: ClassSpec) {
        self.insert_into(Partition::Inventory, spec);
    }

    fn insert_into(&mut self, partition: Partition, spec: ClassSpec) {
        let key = spec.name().clone();
        assert!(
            !self.live.contains_key(&key) && !self.inventory.contains_key(&key),
            "duplicate class spec for {key}"
        );
        let target = match partition {
            Partition::Live => &mut self.live,
            Partition::Inventory => &mut self.inventory,
        };
        let _ = target.insert(key, spec);
    }

    /// Existing spec for `name`, or a new live spec built by `create`.
    pub fn get_or_insert_with<F>(&mut self, name: &str, create: F) -> &mut ClassSpec
    where
        F: FnOnce() -> ClassSpec,
    {
        let key = TypeName::new(name);
        if self.inventory.contains_key(&key) {
            assert!(
                !self.live.contains_key(&key),
                "class spec for {key} present in both live and inventory partitions"
            );
            if let Some(spec) = self.inventory.get_mut(&key) {
                return spec;
            }
        }
        self.live.entry(key).or_insert_with(create)
    }

    /// Remove the spec for `name` from both partitions.
    pub fn remove(&mut self, name: &str) -> Option<ClassSpec> {
        let key = TypeName::new(name);
        let live = self.live.remove(&key);
        let inventory = self.inventory.remove(&key);
        live.or(inventory)
    }

    /// Live specs, plus inventory specs when asked, sorted by name.
    pub fn all(&self, include_inventory: bool) -> Vec<&ClassSpec> {
        let mut specs: Vec<&ClassSpec> = self.live.values().collect();
        if include_inventory {
            specs.extend(self.inventory.values());
        }
        specs.sort_by(|a, b| a.name().cmp(b.name()));
        specs
    }

    /// Mark every live spec as pre-instrumented.
    pub fn mark_all_pre_instrumented(&mut self) {
        for spec in self.live.values_mut() {
            let _ = spec.mark_pre_instrumented();
        }
    }

    /// Number of live specs.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Number of inventory specs.
    pub fn inventory_len(&self) -> usize {
        self.inventory.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
