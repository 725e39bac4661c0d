//! Descriptors handed to the policy engine by the class-loading boundary.
//!
//! The engine never inspects a live type system. Everything it needs to know
//! about a type (its modifiers, pre-resolved ancestry, declared fields) or a
//! member (declaring type, modifiers, return and parameter types) arrives in
//! these plain values.

use serde::{Deserialize, Serialize};

use crate::modifiers::Modifiers;
use crate::names::TypeName;

/// Marker embedded in the names of dynamically generated proxy subtypes.
pub const DYNAMIC_SUBTYPE_MARKER: &str = "$$EnhancerByCGLIB$$";

/// Name of instance initializers.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of type initializers.
pub const TYPE_INITIALIZER_NAME: &str = "<clinit>";

/// Primitive type names.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

/// Whether `type_name` names a primitive type.
pub fn is_primitive_type(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&type_name)
}

/// A type observed at load time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    /// Fully-qualified name.
    pub name: TypeName,
    /// Type-level modifiers.
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Superclass chain, nearest first, excluding the type itself.
    #[serde(default)]
    pub ancestors: Vec<TypeName>,
    /// Implemented interfaces (transitively closed by the loader).
    #[serde(default)]
    pub interfaces: Vec<TypeName>,
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    /// Create a descriptor with no ancestry, interfaces, or fields.
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            modifiers: Modifiers::PUBLIC,
            ancestors: Vec::new(),
            interfaces: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Replace the modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Replace the superclass chain (nearest first).
    #[must_use]
    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TypeName>,
    {
        self.ancestors = ancestors.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the implemented interfaces.
    #[must_use]
    pub fn with_interfaces<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TypeName>,
    {
        self.interfaces = interfaces.into_iter().map(Into::into).collect();
        self
    }

    /// Add a declared field.
    #[must_use]
    pub fn with_field(mut self, name: &str, type_name: &str, modifiers: Modifiers) -> Self {
        let field = FieldDescriptor::new(self.name.clone(), name, type_name).with_modifiers(modifiers);
        self.fields.push(field);
        self
    }

    /// The type's name as a string slice.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Whether this is an interface type.
    pub fn is_interface(&self) -> bool {
        self.modifiers.is_interface()
    }

    /// Whether this is a dynamically generated proxy subtype.
    pub fn is_dynamic_subtype(&self) -> bool {
        self.name.contains(DYNAMIC_SUBTYPE_MARKER)
    }

    /// Look up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The type itself followed by its ancestors and interfaces.
    pub fn lineage(&self) -> impl Iterator<Item = &TypeName> {
        std::iter::once(&self.name)
            .chain(self.ancestors.iter())
            .chain(self.interfaces.iter())
    }
}

/// A field declared by a type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Declaring type.
    pub declaring_type: TypeName,
    /// Field name.
    pub name: String,
    /// Field modifiers.
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Declared type of the field.
    pub type_name: String,
}

impl FieldDescriptor {
    /// Create a field descriptor with no modifiers.
    pub fn new(declaring_type: impl Into<TypeName>, name: &str, type_name: &str) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.to_string(),
            modifiers: Modifiers::NONE,
            type_name: type_name.to_string(),
        }
    }

    /// Replace the modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Whether the field holds a primitive value.
    pub fn is_primitive(&self) -> bool {
        is_primitive_type(&self.type_name)
    }
}

/// A method or constructor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDescriptor {
    /// Declaring type.
    pub declaring_type: TypeName,
    /// Member name (`<init>` for constructors).
    pub name: String,
    /// Member modifiers.
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Return type name (`void` when nothing is returned).
    #[serde(default = "default_return_type")]
    pub return_type: String,
    /// Parameter type names in declaration order.
    #[serde(default)]
    pub parameter_types: Vec<String>,
}

fn default_return_type() -> String {
    "void".to_string()
}

impl MemberDescriptor {
    /// Create a `void`, parameterless, public member.
    pub fn new(declaring_type: impl Into<TypeName>, name: &str) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.to_string(),
            modifiers: Modifiers::PUBLIC,
            return_type: default_return_type(),
            parameter_types: Vec::new(),
        }
    }

    /// Replace the modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Replace the return type.
    #[must_use]
    pub fn returning(mut self, return_type: &str) -> Self {
        self.return_type = return_type.to_string();
        self
    }

    /// Replace the parameter types.
    #[must_use]
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// Key identifying the member within its declaring type:
    /// `name(param1,param2)`.
    pub fn member_key(&self) -> String {
        format!("{}({})", self.name, self.parameter_types.join(","))
    }

    /// Whether this is an instance or type initializer.
    pub fn is_initializer(&self) -> bool {
        self.name == CONSTRUCTOR_NAME || self.name == TYPE_INITIALIZER_NAME
    }
}

impl std::fmt::Display for MemberDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.modifiers != Modifiers::NONE {
            write!(f, "{} ", self.modifiers)?;
        }
        write!(
            f,
            "{} {}.{}({})",
            self.return_type,
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_subtype_detection() {
        let proxy = TypeDescriptor::new("com.acme.Widget$$EnhancerByCGLIB$$1a2b");
        assert!(proxy.is_dynamic_subtype());
        assert!(!TypeDescriptor::new("com.acme.Widget").is_dynamic_subtype());
    }

    #[test]
    fn lineage_starts_with_self() {
        let ty = TypeDescriptor::new("a.C")
            .with_ancestors(["a.B", "java.lang.Object"])
            .with_interfaces(["a.I"]);
        let names: Vec<&str> = ty.lineage().map(TypeName::as_str).collect();
        assert_eq!(names, vec!["a.C", "a.B", "java.lang.Object", "a.I"]);
    }

    #[test]
    fn primitive_fields() {
        let ty = TypeDescriptor::new("a.C")
            .with_field("count", "int", Modifiers::PRIVATE)
            .with_field("cache", "java.util.Map", Modifiers::PRIVATE);
        assert!(ty.field("count").unwrap().is_primitive());
        assert!(!ty.field("cache").unwrap().is_primitive());
        assert!(ty.field("missing").is_none());
    }

    #[test]
    fn member_key_and_display() {
        let m = MemberDescriptor::new("com.acme.Counter", "add")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::SYNCHRONIZED)
            .returning("int")
            .with_parameters(["int", "java.lang.String"]);
        assert_eq!(m.member_key(), "add(int,java.lang.String)");
        assert_eq!(
            m.to_string(),
            "public synchronized int com.acme.Counter.add(int, java.lang.String)"
        );
    }

    #[test]
    fn initializers() {
        assert!(MemberDescriptor::new("a.B", CONSTRUCTOR_NAME).is_initializer());
        assert!(MemberDescriptor::new("a.B", TYPE_INITIALIZER_NAME).is_initializer());
        assert!(!MemberDescriptor::new("a.B", "run").is_initializer());
    }

    #[test]
    fn descriptor_from_loader_json() {
        let json = r#"{
            "name": "com/acme/App",
            "ancestors": ["java/lang/Object"],
            "fields": [{"declaringType": "com/acme/App", "name": "cache", "typeName": "java.util.Map"}]
        }"#;
        let ty: TypeDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(ty.name(), "com.acme.App");
        assert_eq!(ty.ancestors[0].as_str(), "java.lang.Object");
        assert_eq!(ty.modifiers, Modifiers::NONE);
        assert_eq!(ty.field("cache").unwrap().declaring_type.as_str(), "com.acme.App");
    }
}
