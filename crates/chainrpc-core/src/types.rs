//! Runtime type descriptors.
//!
//! A [`TypeDescriptor`] tags the shape of a value. Named kinds (enums, structs
//! and interfaces) refer to their full descriptors by name; the names resolve
//! through the [`Registry`](crate::registry::Registry), which is what allows
//! recursive structs and interfaces.

use std::fmt;

/// The kind of a type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Date,
    Void,
    Enum,
    List,
    Set,
    Map,
    Struct,
    Interface,
    Undefined,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Bool => "bool",
            TypeKind::Int16 => "int16",
            TypeKind::Int32 => "int32",
            TypeKind::Int64 => "int64",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::String => "string",
            TypeKind::Date => "date",
            TypeKind::Void => "void",
            TypeKind::Enum => "enum",
            TypeKind::List => "list",
            TypeKind::Set => "set",
            TypeKind::Map => "map",
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            TypeKind::Undefined => "undefined",
        }
    }

    /// Primitives have a plain string form and can travel in a URL path.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Int16
                | TypeKind::Int32
                | TypeKind::Int64
                | TypeKind::Float
                | TypeKind::Double
                | TypeKind::String
                | TypeKind::Date
        )
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable description of a value's shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Date,
    Void,
    Undefined,
    Enum(String),
    List(Box<TypeDescriptor>),
    Set(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Struct(String),
    Interface(String),
}

impl TypeDescriptor {
    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(element))
    }

    pub fn set(element: TypeDescriptor) -> Self {
        TypeDescriptor::Set(Box::new(element))
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(key), Box::new(value))
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        TypeDescriptor::Enum(name.into())
    }

    pub fn structure(name: impl Into<String>) -> Self {
        TypeDescriptor::Struct(name.into())
    }

    pub fn interface(name: impl Into<String>) -> Self {
        TypeDescriptor::Interface(name.into())
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            TypeDescriptor::Bool => TypeKind::Bool,
            TypeDescriptor::Int16 => TypeKind::Int16,
            TypeDescriptor::Int32 => TypeKind::Int32,
            TypeDescriptor::Int64 => TypeKind::Int64,
            TypeDescriptor::Float => TypeKind::Float,
            TypeDescriptor::Double => TypeKind::Double,
            TypeDescriptor::String => TypeKind::String,
            TypeDescriptor::Date => TypeKind::Date,
            TypeDescriptor::Void => TypeKind::Void,
            TypeDescriptor::Undefined => TypeKind::Undefined,
            TypeDescriptor::Enum(_) => TypeKind::Enum,
            TypeDescriptor::List(_) => TypeKind::List,
            TypeDescriptor::Set(_) => TypeKind::Set,
            TypeDescriptor::Map(_, _) => TypeKind::Map,
            TypeDescriptor::Struct(_) => TypeKind::Struct,
            TypeDescriptor::Interface(_) => TypeKind::Interface,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.kind().is_primitive()
    }

    /// Primitives and enums: values with a string form usable in a path or query.
    pub fn is_scalar(&self) -> bool {
        self.is_primitive() || self.kind() == TypeKind::Enum
    }

    pub fn is_interface(&self) -> bool {
        self.kind() == TypeKind::Interface
    }

    pub fn is_void(&self) -> bool {
        self.kind() == TypeKind::Void
    }

    /// Name of the referenced enum, struct or interface.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Enum(name)
            | TypeDescriptor::Struct(name)
            | TypeDescriptor::Interface(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::List(element) => write!(f, "list<{}>", element),
            TypeDescriptor::Set(element) => write!(f, "set<{}>", element),
            TypeDescriptor::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            TypeDescriptor::Enum(name)
            | TypeDescriptor::Struct(name)
            | TypeDescriptor::Interface(name) => write!(f, "{}", name),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Enum descriptor: an ordered list of case-preserved variant names.
///
/// The position of a variant is its ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: String,
    variants: Vec<String>,
}

impl EnumDescriptor {
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Ordinal of an exactly matching variant name.
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v == name)
    }

    /// Variant name for an ordinal.
    pub fn variant(&self, ordinal: usize) -> Option<&str> {
        self.variants.get(ordinal).map(String::as_str)
    }

    /// Resolve a name case-insensitively to its canonical variant.
    ///
    /// Succeeds only when exactly one variant matches.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let mut matches = self
            .variants
            .iter()
            .filter(|v| v.eq_ignore_ascii_case(name));
        match (matches.next(), matches.next()) {
            (Some(variant), None) => Some(variant),
            _ => None,
        }
    }
}

/// Struct field descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// Struct descriptor: an ordered list of fields.
///
/// A struct may extend a `base` struct; the registry prepends the inherited
/// fields when it is built. A root struct becomes polymorphic by naming an
/// enum-typed `discriminator` field and mapping its variants to subtypes.
/// Form structs travel as one query parameter or body member per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    base: Option<String>,
    discriminator: Option<String>,
    subtypes: Vec<(String, String)>,
    form: bool,
}

impl StructDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            base: None,
            discriminator: None,
            subtypes: Vec::new(),
            form: false,
        }
    }

    /// Append a field; declaration order is encoding order.
    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
        });
        self
    }

    /// Extend another struct.
    pub fn base(mut self, name: impl Into<String>) -> Self {
        self.base = Some(name.into());
        self
    }

    /// Name the enum field that selects the concrete subtype.
    pub fn discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = Some(field.into());
        self
    }

    /// Map a discriminator variant to the struct decoded for it.
    pub fn subtype(mut self, variant: impl Into<String>, name: impl Into<String>) -> Self {
        self.subtypes.push((variant.into(), name.into()));
        self
    }

    /// Mark the struct as a form.
    pub fn form(mut self) -> Self {
        self.form = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every field, inherited ones first once registered.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn base_name(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn discriminator_name(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// `(variant, struct name)` pairs in declaration order.
    pub fn subtypes(&self) -> &[(String, String)] {
        &self.subtypes
    }

    /// Struct mapped to a canonical variant name.
    pub fn subtype_for(&self, variant: &str) -> Option<&str> {
        self.subtypes
            .iter()
            .find(|(v, _)| v == variant)
            .map(|(_, name)| name.as_str())
    }

    /// Variant mapped to a struct name.
    pub fn variant_for(&self, name: &str) -> Option<&str> {
        self.subtypes
            .iter()
            .find(|(_, n)| n == name)
            .map(|(variant, _)| variant.as_str())
    }

    pub fn is_polymorphic(&self) -> bool {
        self.discriminator.is_some()
    }

    pub fn is_form(&self) -> bool {
        self.form
    }

    pub(crate) fn set_fields(&mut self, fields: Vec<FieldDescriptor>) {
        self.fields = fields;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_display() {
        let ty = TypeDescriptor::map(
            TypeDescriptor::String,
            TypeDescriptor::list(TypeDescriptor::structure("User")),
        );
        assert_eq!(ty.kind(), TypeKind::Map);
        assert_eq!(ty.to_string(), "map<string, list<User>>");
        assert!(!ty.is_primitive());
        assert!(TypeDescriptor::Date.is_primitive());
        assert!(TypeDescriptor::enumeration("Status").is_scalar());
        assert!(!TypeDescriptor::enumeration("Status").is_primitive());
    }

    #[test]
    fn test_enum_ordinals() {
        let status = EnumDescriptor::new("Status", ["ACTIVE", "INACTIVE"]);
        assert_eq!(status.ordinal("INACTIVE"), Some(1));
        assert_eq!(status.ordinal("inactive"), None);
        assert_eq!(status.variant(0), Some("ACTIVE"));
        assert_eq!(status.variant(2), None);
    }

    #[test]
    fn test_enum_resolve_case_insensitive() {
        let status = EnumDescriptor::new("Status", ["ACTIVE", "INACTIVE"]);
        assert_eq!(status.resolve("ACTIVE"), Some("ACTIVE"));
        assert_eq!(status.resolve("active"), Some("ACTIVE"));
        assert_eq!(status.resolve("Active"), Some("ACTIVE"));
        assert_eq!(status.resolve("bogus"), None);
    }

    #[test]
    fn test_enum_resolve_ambiguous() {
        let mixed = EnumDescriptor::new("Mixed", ["On", "ON"]);
        assert_eq!(mixed.resolve("on"), None);
    }

    #[test]
    fn test_struct_field_order() {
        let point = StructDescriptor::new("Point")
            .field("x", TypeDescriptor::Int32)
            .field("y", TypeDescriptor::Int32);
        let names: Vec<_> = point.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
        assert_eq!(point.find_field("y").map(|f| &f.ty), Some(&TypeDescriptor::Int32));
    }

    #[test]
    fn test_subtype_mapping() {
        let event = StructDescriptor::new("Event")
            .field("kind", TypeDescriptor::enumeration("EventKind"))
            .discriminator("kind")
            .subtype("CREATED", "Created")
            .subtype("DELETED", "Deleted");
        assert!(event.is_polymorphic());
        assert!(!event.is_form());
        assert_eq!(event.subtype_for("DELETED"), Some("Deleted"));
        assert_eq!(event.subtype_for("deleted"), None);
        assert_eq!(event.variant_for("Created"), Some("CREATED"));
        assert_eq!(StructDescriptor::new("Created").base("Event").base_name(), Some("Event"));
    }
}
