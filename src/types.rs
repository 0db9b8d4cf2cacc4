//! Type catalog: canonical descriptors for WSDL-declared types.
//!
//! Types live in a name-keyed arena. Fields and elements that name another
//! declared type hold a [`TypeRef::Named`] indirection instead of an inlined
//! copy, so self-referencing and mutually-referencing structs are fine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::parser::{parse_type_declaration, RawType, StructBody};

/// Prefix of schema pointers emitted for named types.
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Namespace prefixes stripped before scalar lookup.
const XSD_PREFIXES: &[&str] = &["xs:", "xsd:"];

/// Canonical scalar categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    Decimal,
    String,
    /// QName, token, NCName and friends
    DerivedString,
    Base64Binary,
    HexBinary,
    Binary,
    Boolean,
    Date,
    Time,
    DateTime,
    Duration,
    Uri,
    Password,
    AnyType,
    AnySimpleType,
    AnyXml,
    /// Unknown wire type, carried as a string
    Undetermined,
}

/// A wire scalar type mapped to its canonical kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
    /// Name as declared on the wire
    pub wire_name: String,
    pub kind: ScalarKind,
}

impl ScalarType {
    /// Map a wire type name through the scalar table.
    ///
    /// Unknown names never fail: they become [`ScalarKind::Undetermined`].
    pub fn from_wire(name: &str) -> Self {
        let kind = match scalar_kind(strip_xsd_prefix(name)) {
            Some(kind) => kind,
            None => {
                warn!(wire_type = %name, "SOAP type unknown, mapping to string");
                ScalarKind::Undetermined
            }
        };
        Self {
            wire_name: name.to_string(),
            kind,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        self.kind == ScalarKind::Undetermined
    }

    /// Schema-document representation.
    pub fn schema(&self) -> Value {
        use ScalarKind::*;

        let (ty, format, description): (Option<&str>, Option<&str>, std::string::String) =
            match self.kind {
                Int8 => (Some("integer"), Some("int8"), "signed 8-bit integer".into()),
                UInt8 => (Some("integer"), Some("int8"), "unsigned 8-bit integer".into()),
                Int16 => (Some("integer"), Some("int16"), "signed 16-bit integer".into()),
                UInt16 => (Some("integer"), Some("int16"), "unsigned 16-bit integer".into()),
                Int32 => (Some("integer"), Some("int32"), "signed 32-bit integer".into()),
                UInt32 => (Some("integer"), Some("int32"), "unsigned 32-bit integer".into()),
                Int64 => (Some("integer"), Some("int64"), "signed 64-bit integer".into()),
                UInt64 => (Some("integer"), Some("int64"), "unsigned 64-bit integer".into()),
                Float => (Some("number"), Some("float"), "float".into()),
                Double => (Some("number"), Some("double"), "double".into()),
                Decimal => (Some("number"), None, "decimal".into()),
                String => (Some("string"), None, "string".into()),
                DerivedString => (
                    Some("string"),
                    None,
                    format!("derived string type: {}", self.wire_name),
                ),
                Base64Binary => (Some("string"), Some("byte"), "Base64-encoded characters".into()),
                HexBinary => (Some("string"), Some("binary"), "hexadecimal-encoded characters".into()),
                Binary => (Some("string"), Some("binary"), "any sequence of octets".into()),
                Boolean => (Some("boolean"), None, "true or false".into()),
                Date => (Some("string"), Some("date"), "As defined by full-date - RFC3339".into()),
                Time => (Some("string"), None, "As defined by time - RFC3339".into()),
                DateTime => (
                    Some("string"),
                    Some("date-time"),
                    "As defined by date-time - RFC3339".into(),
                ),
                Duration => (
                    Some("string"),
                    None,
                    "Duration or time interval as specified in the following form \"PnYnMnDTnHnMnS\"."
                        .into(),
                ),
                Uri => (Some("string"), Some("uri"), "any valid URI".into()),
                Password => (
                    Some("string"),
                    Some("password"),
                    "Used to hint UIs the input needs to be obscured".into(),
                ),
                AnyType => (None, None, "any type".into()),
                AnySimpleType => (None, None, "any simple type".into()),
                AnyXml => (None, None, "any XML".into()),
                Undetermined => (
                    Some("string"),
                    None,
                    format!("undetermined type: {}", self.wire_name),
                ),
            };

        let mut schema = Map::new();
        if let Some(ty) = ty {
            schema.insert("type".to_string(), Value::from(ty));
        }
        if let Some(format) = format {
            schema.insert("format".to_string(), Value::from(format));
        }
        schema.insert("description".to_string(), Value::from(description));
        Value::Object(schema)
    }
}

fn strip_xsd_prefix(name: &str) -> &str {
    XSD_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

fn scalar_kind(name: &str) -> Option<ScalarKind> {
    use ScalarKind::*;

    let kind = match name {
        "byte" => Int8,
        "unsignedByte" => UInt8,
        "short" => Int16,
        "unsignedShort" => UInt16,
        "int" | "integer" | "negativeInteger" | "nonNegativeInteger" | "nonPositiveInteger"
        | "positiveInteger" => Int32,
        "unsignedInt" => UInt32,
        "long" => Int64,
        "unsignedLong" => UInt64,
        "float" => Float,
        "double" => Double,
        "decimal" => Decimal,
        "string" => String,
        "base64Binary" => Base64Binary,
        "hexBinary" => HexBinary,
        "binary" => Binary,
        "boolean" => Boolean,
        "date" => Date,
        "time" => Time,
        "dateTime" | "gYearMonth" | "gYear" | "gMonthDay" | "gDay" | "gMonth" => DateTime,
        "duration" => Duration,
        "password" => Password,
        "anyURI" => Uri,
        "anyType" => AnyType,
        "anySimpleType" => AnySimpleType,
        "anyXML" | "<anyXML>" => AnyXml,
        "QName" | "NOTATION" | "normalizedString" | "token" | "language" | "ID" | "IDREF"
        | "IDREFS" | "ENTITY" | "ENTITIES" | "NMTOKEN" | "NMTOKENS" | "Name" | "NCName" => {
            DerivedString
        }
        _ => return None,
    };
    Some(kind)
}

/// Reference from a field or element to its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum TypeRef {
    /// Another type declared in the same catalog
    Named(String),
    Scalar(ScalarType),
}

impl TypeRef {
    pub fn schema(&self) -> Value {
        match self {
            Self::Named(name) => schema_ref(name),
            Self::Scalar(scalar) => scalar.schema(),
        }
    }
}

/// A struct member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

/// Resolved shape of a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "of", rename_all = "snake_case")]
pub enum TypeShape {
    Scalar(ScalarType),
    /// Fields in declaration order
    Object(Vec<Field>),
    Array(TypeRef),
    /// Alias of another declared type
    Reference(String),
}

impl TypeShape {
    /// Flattened schema: named types are emitted as `$ref` pointers.
    pub fn schema(&self) -> Value {
        match self {
            Self::Scalar(scalar) => scalar.schema(),
            Self::Object(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|field| (field.name.clone(), field.ty.schema()))
                    .collect();
                json!({ "type": "object", "properties": properties })
            }
            Self::Array(element) => json!({ "type": "array", "items": element.schema() }),
            Self::Reference(name) => schema_ref(name),
        }
    }
}

/// One declared remote type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub shape: TypeShape,
}

/// All types declared by one service, keyed (and ordered) by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCatalog {
    types: BTreeMap<String, TypeDescriptor>,
}

impl TypeCatalog {
    /// Build the catalog from raw type declarations.
    pub fn build<S: AsRef<str>>(declarations: &[S]) -> Self {
        // First pass: collect names so the second pass can tell declared
        // types from primitives.
        let mut raw: BTreeMap<String, RawType> = BTreeMap::new();
        for declaration in declarations {
            let declaration = declaration.as_ref();
            match parse_type_declaration(declaration) {
                Some(parsed) => {
                    if raw.insert(parsed.name().to_string(), parsed).is_some() {
                        debug!(declaration = %declaration, "Duplicate type declaration replaces earlier one");
                    }
                }
                None => debug!(declaration = %declaration, "Skipping unparseable type declaration"),
            }
        }

        let resolve = |name: &str| -> TypeRef {
            if raw.contains_key(name) {
                TypeRef::Named(name.to_string())
            } else {
                TypeRef::Scalar(ScalarType::from_wire(name))
            }
        };

        let types = raw
            .iter()
            .map(|(name, parsed)| {
                let shape = match parsed {
                    RawType::Struct {
                        body: StructBody::ArrayOf(element),
                        ..
                    } => TypeShape::Array(resolve(element)),
                    RawType::Struct {
                        body: StructBody::Fields(fields),
                        ..
                    } => TypeShape::Object(
                        fields
                            .iter()
                            .map(|(field, ty)| Field {
                                name: field.clone(),
                                ty: resolve(ty),
                            })
                            .collect(),
                    ),
                    RawType::Alias { target, .. } => match resolve(target) {
                        TypeRef::Named(target) => TypeShape::Reference(target),
                        TypeRef::Scalar(scalar) => TypeShape::Scalar(scalar),
                    },
                };
                let descriptor = TypeDescriptor {
                    name: name.clone(),
                    shape,
                };
                (name.clone(), descriptor)
            })
            .collect();

        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Descriptors ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Flattened schema fragment for every type, ordered by name.
    pub fn schemas(&self) -> Map<String, Value> {
        self.types
            .iter()
            .map(|(name, descriptor)| (name.clone(), descriptor.shape.schema()))
            .collect()
    }

    /// Inline schema for `name`, expanding nested named types.
    ///
    /// A name that is already being expanded further up the walk is emitted
    /// as a `$ref` pointer, which is what breaks cycles.
    pub fn expand(&self, name: &str) -> Option<Value> {
        let descriptor = self.types.get(name)?;
        let mut path = BTreeSet::new();
        path.insert(name.to_string());
        Some(self.expand_shape(&descriptor.shape, &mut path))
    }

    fn expand_shape(&self, shape: &TypeShape, path: &mut BTreeSet<String>) -> Value {
        match shape {
            TypeShape::Scalar(scalar) => scalar.schema(),
            TypeShape::Object(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|field| (field.name.clone(), self.expand_ref(&field.ty, path)))
                    .collect();
                json!({ "type": "object", "properties": properties })
            }
            TypeShape::Array(element) => {
                json!({ "type": "array", "items": self.expand_ref(element, path) })
            }
            TypeShape::Reference(target) => self.expand_named(target, path),
        }
    }

    fn expand_ref(&self, ty: &TypeRef, path: &mut BTreeSet<String>) -> Value {
        match ty {
            TypeRef::Named(name) => self.expand_named(name, path),
            TypeRef::Scalar(scalar) => scalar.schema(),
        }
    }

    fn expand_named(&self, name: &str, path: &mut BTreeSet<String>) -> Value {
        let descriptor = match self.types.get(name) {
            Some(descriptor) if !path.contains(name) => descriptor,
            _ => return schema_ref(name),
        };
        path.insert(name.to_string());
        let schema = self.expand_shape(&descriptor.shape, path);
        path.remove(name);
        schema
    }
}

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("{}{}", SCHEMA_REF_PREFIX, name) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str) -> TypeRef {
        TypeRef::Scalar(ScalarType::from_wire(name))
    }

    #[test]
    fn test_struct_becomes_object_in_declaration_order() {
        let catalog = TypeCatalog::build(&[
            "struct Person { string name; int age; Address home; }",
            "struct Address { string street; }",
        ]);

        let person = catalog.get("Person").unwrap();
        assert_eq!(
            person.shape,
            TypeShape::Object(vec![
                Field { name: "name".into(), ty: scalar("string") },
                Field { name: "age".into(), ty: scalar("int") },
                Field { name: "home".into(), ty: TypeRef::Named("Address".into()) },
            ])
        );
    }

    #[test]
    fn test_array_convention() {
        let catalog = TypeCatalog::build(&[
            "struct ArrayOfAddress { Address complexObjectArray; }",
            "struct ArrayOfString { string complexObjectArray; }",
            "struct Address { string street; }",
        ]);

        assert_eq!(
            catalog.get("ArrayOfAddress").unwrap().shape,
            TypeShape::Array(TypeRef::Named("Address".into()))
        );
        assert_eq!(
            catalog.get("ArrayOfString").unwrap().shape,
            TypeShape::Array(scalar("string"))
        );
        assert_eq!(
            catalog.get("ArrayOfAddress").unwrap().shape.schema(),
            json!({"type": "array", "items": {"$ref": "#/components/schemas/Address"}})
        );
    }

    #[test]
    fn test_aliases() {
        let catalog = TypeCatalog::build(&[
            "string CountryCode",
            "CountryCode Iso",
            "struct Address { string street; }",
        ]);

        assert_eq!(
            catalog.get("CountryCode").unwrap().shape,
            TypeShape::Scalar(ScalarType::from_wire("string"))
        );
        assert_eq!(
            catalog.get("Iso").unwrap().shape,
            TypeShape::Reference("CountryCode".into())
        );
    }

    #[test]
    fn test_output_sorted_and_idempotent() {
        let declarations = [
            "struct Zebra { string a; }",
            "struct Apple { Zebra z; }",
            "int Mango",
        ];
        let first = TypeCatalog::build(&declarations);
        let second = TypeCatalog::build(&declarations);
        assert_eq!(first, second);

        let names: Vec<_> = first.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Mango", "Zebra"]);
        let keys: Vec<_> = first.schemas().keys().cloned().collect();
        assert_eq!(keys, vec!["Apple", "Mango", "Zebra"]);
    }

    #[test]
    fn test_unknown_scalar_is_undetermined_not_error() {
        let catalog = TypeCatalog::build(&["struct Window { xs:duration-ext span; }"]);
        let schema = catalog.get("Window").unwrap().shape.schema();
        assert_eq!(
            schema["properties"]["span"],
            json!({"type": "string", "description": "undetermined type: xs:duration-ext"})
        );
    }

    #[test]
    fn test_scalar_table() {
        assert_eq!(ScalarType::from_wire("xsd:long").kind, ScalarKind::Int64);
        assert_eq!(ScalarType::from_wire("unsignedShort").kind, ScalarKind::UInt16);
        assert_eq!(ScalarType::from_wire("gYear").kind, ScalarKind::DateTime);
        assert_eq!(ScalarType::from_wire("<anyXML>").kind, ScalarKind::AnyXml);
        assert!(ScalarType::from_wire("Frobnicator").is_undetermined());

        assert_eq!(
            ScalarType::from_wire("dateTime").schema(),
            json!({"type": "string", "format": "date-time", "description": "As defined by date-time - RFC3339"})
        );
        assert_eq!(
            ScalarType::from_wire("NCName").schema()["description"],
            "derived string type: NCName"
        );
        assert_eq!(
            ScalarType::from_wire("anyType").schema(),
            json!({"description": "any type"})
        );
    }

    #[test]
    fn test_expand_inlines_nested_types() {
        let catalog = TypeCatalog::build(&[
            "struct Address { string street; string city; }",
            "struct GetAddressResponse { Address result; }",
        ]);
        let expanded = catalog.expand("GetAddressResponse").unwrap();
        assert_eq!(
            expanded["properties"]["result"]["properties"]["city"]["type"],
            "string"
        );
    }

    #[test]
    fn test_expand_breaks_cycles_with_refs() {
        let catalog = TypeCatalog::build(&[
            "struct Node { string value; Node next; Tree owner; }",
            "struct Tree { Node root; }",
            "Loop Loop",
        ]);

        let node = catalog.expand("Node").unwrap();
        assert_eq!(
            node["properties"]["next"],
            json!({"$ref": "#/components/schemas/Node"})
        );
        assert_eq!(
            node["properties"]["owner"]["properties"]["root"],
            json!({"$ref": "#/components/schemas/Node"})
        );

        assert_eq!(
            catalog.expand("Loop").unwrap(),
            json!({"$ref": "#/components/schemas/Loop"})
        );
        assert!(catalog.expand("Missing").is_none());
    }

    #[test]
    fn test_catalog_serde_roundtrip() {
        let catalog = TypeCatalog::build(&[
            "struct A { B b; string s; }",
            "struct B { A complexObjectArray; }",
            "B C",
        ]);
        let bytes = serde_json::to_vec(&catalog).unwrap();
        let back: TypeCatalog = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, catalog);
    }
}
