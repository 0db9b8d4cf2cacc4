//! Parsing of raw introspection declarations.
//!
//! SOAP transports describe a service as two lists of strings: type
//! declarations (`struct Name { type field; ... }` or `type Alias`) and
//! function signatures (`ResponseType name(RequestType arg)`). Parsing never
//! fails hard; a declaration that cannot be understood is dropped.

/// Field name marking a struct as an array of its single element type.
pub const ARRAY_MARKER: &str = "complexObjectArray";

const STRUCT_PREFIX: &str = "struct ";

/// A parsed type declaration, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawType {
    /// `struct Name { ... }`
    Struct { name: String, body: StructBody },
    /// `type Alias`
    Alias { name: String, target: String },
}

impl RawType {
    pub fn name(&self) -> &str {
        match self {
            Self::Struct { name, .. } | Self::Alias { name, .. } => name,
        }
    }
}

/// Body of a struct declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructBody {
    /// `(field name, type name)` pairs in declaration order
    Fields(Vec<(String, String)>),
    /// Single `type complexObjectArray;` body
    ArrayOf(String),
}

/// A parsed function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    pub name: String,
    pub response_type: String,
    pub request_type: Option<String>,
}

/// Parse one type declaration.
pub fn parse_type_declaration(declaration: &str) -> Option<RawType> {
    let declaration = declaration.trim();
    match declaration.strip_prefix(STRUCT_PREFIX) {
        Some(rest) => parse_struct(rest),
        None => parse_alias(declaration),
    }
}

fn parse_struct(rest: &str) -> Option<RawType> {
    let rest = rest.trim_start();
    let name_end = rest
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return None;
    }

    let body = rest[name_end..].trim_matches(|c: char| c == '{' || c == '}' || c == '\0' || c.is_whitespace());

    let body = match array_element(body) {
        Some(element) => StructBody::ArrayOf(element.to_string()),
        None => StructBody::Fields(
            body.split(';')
                .filter_map(|member| {
                    let mut parts = member.split_whitespace();
                    let ty = parts.next()?;
                    let field = parts.next()?;
                    Some((field.to_string(), ty.to_string()))
                })
                .collect(),
        ),
    };

    Some(RawType::Struct {
        name: name.to_string(),
        body,
    })
}

/// Element type of a `T complexObjectArray;` body.
fn array_element(body: &str) -> Option<&str> {
    let mut members = body.split(';').map(str::trim).filter(|m| !m.is_empty());
    let member = members.next()?;
    if members.next().is_some() {
        return None;
    }

    let mut parts = member.split_whitespace();
    let ty = parts.next()?;
    let field = parts.next()?;
    if parts.next().is_none() && field.eq_ignore_ascii_case(ARRAY_MARKER) {
        Some(ty)
    } else {
        None
    }
}

fn parse_alias(declaration: &str) -> Option<RawType> {
    let mut parts = declaration.split_whitespace();
    let target = parts.next()?;
    let name = parts.next()?;
    Some(RawType::Alias {
        name: name.to_string(),
        target: target.to_string(),
    })
}

/// Parse one function signature.
pub fn parse_function_signature(signature: &str) -> Option<RawSignature> {
    let signature = signature.trim();
    let (response_type, rest) = signature.split_once(' ')?;
    let open = rest.find('(')?;
    let name = rest[..open].trim();
    if name.is_empty() || response_type.is_empty() {
        return None;
    }

    let arguments = rest[open + 1..].trim_end().trim_end_matches(')');
    let request_type = arguments
        .split(|c: char| c.is_whitespace() || c == ',')
        .find(|token| !token.is_empty())
        .map(str::to_string);

    Some(RawSignature {
        name: name.to_string(),
        response_type: response_type.to_string(),
        request_type,
    })
}
