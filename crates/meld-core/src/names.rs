//! Normalized type names.
//!
//! Type names reach the engine in two spellings: dotted (`java.util.HashMap`)
//! and internal slash form (`java/util/HashMap`). [`TypeName`] normalizes to
//! the dotted form on construction so that every registry lookup agrees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between an outer type and a nested type.
pub const NESTED_SEPARATOR: char = '$';

/// A fully-qualified type name in dotted form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name, normalizing `/` separators to `.`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.contains('/') {
            Self(name.replace('/', "."))
        } else {
            Self(name)
        }
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Name of the outermost enclosing type (everything before the first `$`).
    #[must_use]
    pub fn outer(&self) -> &str {
        outer_type_name(&self.0)
    }

    /// Whether this names a nested (inner) type.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.0.contains(NESTED_SEPARATOR)
    }

    /// Package portion of the name (empty for the default package).
    #[must_use]
    pub fn package(&self) -> &str {
        self.0.rfind('.').map_or("", |idx| &self.0[..idx])
    }
}

/// Name of the outermost enclosing type of `name`.
///
/// `com.acme.Outer$Inner$Deeper` → `com.acme.Outer`.
pub fn outer_type_name(name: &str) -> &str {
    name.find(NESTED_SEPARATOR).map_or(name, |idx| &name[..idx])
}

impl std::ops::Deref for TypeName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_form_is_normalized() {
        let name = TypeName::new("java/util/HashMap");
        assert_eq!(name.as_str(), "java.util.HashMap");
    }

    #[test]
    fn dotted_form_is_untouched() {
        let name = TypeName::from("com.acme.Widget");
        assert_eq!(name, TypeName::new("com/acme/Widget"));
    }

    #[test]
    fn outer_of_nested() {
        assert_eq!(outer_type_name("com.acme.Outer$Inner$Deeper"), "com.acme.Outer");
        assert_eq!(outer_type_name("com.acme.Outer"), "com.acme.Outer");
        assert!(TypeName::new("a.B$C").is_nested());
        assert!(!TypeName::new("a.B").is_nested());
    }

    #[test]
    fn package_portion() {
        assert_eq!(TypeName::new("java.lang.Thread").package(), "java.lang");
        assert_eq!(TypeName::new("Toplevel").package(), "");
    }

    #[test]
    fn serde_normalizes() {
        let name: TypeName = serde_json::from_str("\"java/lang/Object\"").unwrap();
        assert_eq!(name.as_str(), "java.lang.Object");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"java.lang.Object\"");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn slash_and_dot_forms_agree(segments in proptest::collection::vec("[a-zA-Z_$][a-zA-Z0-9_$]{0,6}", 1..6)) {
                let dotted = TypeName::new(segments.join("."));
                let slashed = TypeName::new(segments.join("/"));
                prop_assert_eq!(&dotted, &slashed);
                prop_assert!(!dotted.contains('/'));
            }

            #[test]
            fn outer_has_no_nested_separator(name in "[a-z]{1,4}(\\.[A-Z][a-z]{0,4}){1,3}(\\$[A-Za-z0-9]{1,4}){0,3}") {
                let name = TypeName::new(name);
                prop_assert!(!name.outer().contains(NESTED_SEPARATOR));
                prop_assert!(name.as_str().starts_with(name.outer()));
            }
        }
    }
}
