//! Root registry.
//!
//! Roots are cluster-wide named entry points, keyed by declaring type and
//! field name.

use std::collections::BTreeMap;

use meld_core::{TypeDescriptor, TypeName};
use serde::{Deserialize, Serialize};

use crate::errors::{PolicyError, Result};

/// A field registered as a root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootDefinition {
    /// Declaring type.
    pub type_name: TypeName,
    /// Field name.
    pub field_name: String,
    /// Exposed name; `type.field` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_name: Option<String>,
    /// Explicit finality; inferred from the field type when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
}

impl RootDefinition {
    /// A root with default name and inferred finality.
    pub fn new(type_name: impl Into<TypeName>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
            root_name: None,
            is_final: None,
        }
    }

    /// Set the exposed name.
    #[must_use]
    pub fn named(mut self, root_name: impl Into<String>) -> Self {
        self.root_name = Some(root_name.into());
        self
    }

    /// Set explicit finality.
    #[must_use]
    pub fn with_finality(mut self, is_final: bool) -> Self {
        self.is_final = Some(is_final);
        self
    }

    /// The exposed root name.
    pub fn exposed_name(&self) -> String {
        self.root_name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.type_name, self.field_name))
    }

    /// Whether the root reference may never be reassigned.
    ///
    /// Reference roots default to final, primitive roots to mutable.
    pub fn is_final_for(&self, is_primitive: bool) -> bool {
        self.is_final.unwrap_or(!is_primitive)
    }
}

/// Registered roots.
#[derive(Debug, Default)]
pub struct RootRegistry {
    roots: BTreeMap<(String, String), RootDefinition>,
}

impl RootRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root.
    pub fn add(&mut self, root: RootDefinition) -> Result<()> {
        if root.field_name.is_empty() {
            return Err(PolicyError::InvalidFieldName {
                name: format!("{}.", root.type_name),
            });
        }
        let key = (root.type_name.as_str().to_string(), root.field_name.clone());
        if self.roots.contains_key(&key) {
            return Err(PolicyError::DuplicateRoot {
                type_name: key.0,
                field: key.1,
            });
        }
        let _ = self.roots.insert(key, root);
        Ok(())
    }

    /// Root definition for the field, if registered.
    pub fn get(&self, type_name: &str, field: &str) -> Option<&RootDefinition> {
        self.roots
            .get(&(TypeName::new(type_name).into_inner(), field.to_string()))
    }

    /// Whether the field is a root.
    pub fn is_root(&self, type_name: &str, field: &str) -> bool {
        self.get(type_name, field).is_some()
    }

    /// Exposed name of a root.
    ///
    /// # Panics
    ///
    /// If the field is not a root. Check [`is_root`](Self::is_root) first.
    pub fn root_name_for(&self, type_name: &str, field: &str) -> String {
        self.require(type_name, field).exposed_name()
    }

    /// Finality of a root.
    ///
    /// # Panics
    ///
    /// If the field is not a root. Check [`is_root`](Self::is_root) first.
    pub fn is_root_final(&self, type_name: &str, field: &str, is_primitive: bool) -> bool {
        self.require(type_name, field).is_final_for(is_primitive)
    }

    fn require(&self, type_name: &str, field: &str) -> &RootDefinition {
        match self.get(type_name, field) {
            Some(root) => root,
            None => panic!("no such root for field {field} in type {type_name}"),
        }
    }

    /// Whether the type declares any root.
    pub fn has_roots(&self, type_name: &str) -> bool {
        self.roots_for(type_name).next().is_some()
    }

    /// Roots declared by the type.
    pub fn roots_for<'a>(&'a self, type_name: &str) -> impl Iterator<Item = &'a RootDefinition> {
        let owner = TypeName::new(type_name).into_inner();
        self.roots
            .range((owner.clone(), String::new())..)
            .take_while(move |((t, _), _)| *t == owner)
            .map(|(_, root)| root)
    }

    /// Roots registered for the type whose field the descriptor does not
    /// declare, as `type.field`.
    pub fn missing_declarations(&self, ty: &TypeDescriptor) -> Vec<String> {
        self.roots_for(ty.name())
            .filter(|root| ty.field(&root.field_name).is_none())
            .map(|root| format!("{}.{}", root.type_name, root.field_name))
            .collect()
    }

    /// Every root, ordered by type then field.
    pub fn all(&self) -> impl Iterator<Item = &RootDefinition> {
        self.roots.values()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
