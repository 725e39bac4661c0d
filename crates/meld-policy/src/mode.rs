//! Transformation mode state machine.
//!
//! [`decide`] is pure: everything it needs about registered specs and rules
//! comes through [`ModeFacts`]. The engine implements it over a consistent
//! snapshot of its stores; tests implement it over plain maps.

use meld_core::{TypeDescriptor, TypeName};

use crate::matcher::PatternError;
use crate::spec::TransformMode;

/// Registry facts the mode decision depends on.
pub trait ModeFacts {
    /// Mode recorded on the type's own spec, [`TransformMode::Unset`] when
    /// there is no spec or no explicit mode.
    fn explicit_mode(&self, type_name: &str) -> TransformMode;

    /// Whether the type has a logical spec.
    fn is_logical(&self, type_name: &str) -> bool;

    /// Whether the type's rule disposition is include.
    fn is_included(&self, ty: &TypeDescriptor) -> Result<bool, PatternError>;

    /// Whether a non-portable rule matches the type.
    fn is_non_portable(&self, ty: &TypeDescriptor) -> Result<bool, PatternError>;
}

/// Mode for `ty`, given whether it is transformable at all.
///
/// Ancestors are walked nearest first. Each ancestor is checked against the
/// non-portable rules with its own remaining ancestry, so `+` patterns see
/// the same hierarchy they would when that ancestor is decided directly.
pub fn decide(
    ty: &TypeDescriptor,
    transformable: bool,
    facts: &impl ModeFacts,
) -> Result<TransformMode, PatternError> {
    if ty.is_interface() || !transformable {
        return Ok(TransformMode::NotAdaptable);
    }

    let explicit = facts.explicit_mode(ty.name());
    if explicit.is_set() {
        return Ok(explicit);
    }

    if facts.is_logical(ty.name()) || facts.is_included(ty)? {
        return Ok(TransformMode::FullyTransformable);
    }

    for (index, ancestor) in ty.ancestors.iter().enumerate() {
        if facts.explicit_mode(ancestor) == TransformMode::AdaptableOnly {
            return Ok(TransformMode::AdaptableOnly);
        }
        let descriptor = ancestor_descriptor(ty, index);
        if facts.is_non_portable(&descriptor)? {
            return Ok(TransformMode::AdaptableOnly);
        }
    }

    Ok(TransformMode::FullyTransformable)
}

fn ancestor_descriptor(ty: &TypeDescriptor, index: usize) -> TypeDescriptor {
    let name: &TypeName = &ty.ancestors[index];
    TypeDescriptor::new(name.clone()).with_ancestors(ty.ancestors[index + 1..].iter().cloned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use meld_core::Modifiers;

    use super::*;

    #[derive(Default)]
    struct Facts {
        modes: HashMap<String, TransformMode>,
        logical: HashSet<String>,
        included: HashSet<String>,
        non_portable: HashSet<String>,
        fail_on: Option<String>,
    }

    impl ModeFacts for Facts {
        fn explicit_mode(&self, type_name: &str) -> TransformMode {
            self.modes.get(type_name).copied().unwrap_or_default()
        }

        fn is_logical(&self, type_name: &str) -> bool {
            self.logical.contains(type_name)
        }

        fn is_included(&self, ty: &TypeDescriptor) -> Result<bool, PatternError> {
            Ok(self.included.contains(ty.name()))
        }

        fn is_non_portable(&self, ty: &TypeDescriptor) -> Result<bool, PatternError> {
            if self.fail_on.as_deref() == Some(ty.name()) {
                return Err(PatternError::Empty);
            }
            Ok(self.non_portable.contains(ty.name()))
        }
    }

    fn widget() -> TypeDescriptor {
        TypeDescriptor::new("com.acme.Widget").with_ancestors(["com.acme.Base", "java.lang.Object"])
    }

    #[test]
    fn interfaces_and_untransformable_are_not_adaptable() {
        let facts = Facts::default();
        let iface = TypeDescriptor::new("com.acme.Api").with_modifiers(Modifiers::INTERFACE);
        assert_eq!(decide(&iface, true, &facts).unwrap(), TransformMode::NotAdaptable);
        assert_eq!(decide(&widget(), false, &facts).unwrap(), TransformMode::NotAdaptable);
    }

    #[test]
    fn explicit_mode_wins() {
        let mut facts = Facts::default();
        let _ = facts
            .modes
            .insert("com.acme.Widget".into(), TransformMode::AdaptableOnly);
        let _ = facts.included.insert("com.acme.Widget".into());
        assert_eq!(decide(&widget(), true, &facts).unwrap(), TransformMode::AdaptableOnly);
    }

    #[test]
    fn logical_or_included_is_fully_transformable() {
        let mut facts = Facts::default();
        let _ = facts.non_portable.insert("com.acme.Base".into());
        let _ = facts.included.insert("com.acme.Widget".into());
        assert_eq!(decide(&widget(), true, &facts).unwrap(), TransformMode::FullyTransformable);

        let mut facts = Facts::default();
        let _ = facts.non_portable.insert("com.acme.Base".into());
        let _ = facts.logical.insert("com.acme.Widget".into());
        assert_eq!(decide(&widget(), true, &facts).unwrap(), TransformMode::FullyTransformable);
    }

    #[test]
    fn adaptable_only_ancestor() {
        let mut facts = Facts::default();
        let _ = facts
            .modes
            .insert("java.lang.Object".into(), TransformMode::AdaptableOnly);
        assert_eq!(decide(&widget(), true, &facts).unwrap(), TransformMode::AdaptableOnly);
    }

    #[test]
    fn non_portable_ancestor() {
        let mut facts = Facts::default();
        let _ = facts.non_portable.insert("com.acme.Base".into());
        assert_eq!(decide(&widget(), true, &facts).unwrap(), TransformMode::AdaptableOnly);
    }

    #[test]
    fn plain_type_defaults_to_fully_transformable() {
        let facts = Facts::default();
        assert_eq!(decide(&widget(), true, &facts).unwrap(), TransformMode::FullyTransformable);
    }

    #[test]
    fn ancestor_descriptor_keeps_remaining_chain() {
        let ty = widget();
        let base = ancestor_descriptor(&ty, 0);
        assert_eq!(base.name(), "com.acme.Base");
        assert_eq!(base.ancestors, vec![TypeName::new("java.lang.Object")]);
        assert!(ancestor_descriptor(&ty, 1).ancestors.is_empty());
    }

    #[test]
    fn matcher_errors_propagate() {
        let facts = Facts {
            fail_on: Some("com.acme.Base".into()),
            ..Facts::default()
        };
        assert!(decide(&widget(), true, &facts).is_err());
    }
}
