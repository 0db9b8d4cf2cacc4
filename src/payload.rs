//! Payload marshaling and result unmarshaling.
//!
//! Callers send plain JSON. A nested object carrying the reserved `soapvar`
//! key asks for an explicitly-typed wire value instead; it is recognized in a
//! single rewrite pass and becomes a [`SoapValue::Typed`] leaf. Results come
//! back as a [`RemoteValue`] object graph and are flattened to plain JSON.

use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::transport::RemoteValue;

/// Reserved key marking an explicitly-typed value (matched case-insensitively).
pub const TYPED_VALUE_KEY: &str = "soapvar";

/// Wire encoding of a typed value, using the SOAP extension's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding(pub u32);

impl Encoding {
    pub const XSD_STRING: Self = Self(101);
    pub const XSD_BOOLEAN: Self = Self(102);
    pub const XSD_DECIMAL: Self = Self(103);
    pub const XSD_FLOAT: Self = Self(104);
    pub const XSD_DOUBLE: Self = Self(105);
    pub const XSD_DURATION: Self = Self(106);
    pub const XSD_DATETIME: Self = Self(107);
    pub const XSD_TIME: Self = Self(108);
    pub const XSD_DATE: Self = Self(109);
    pub const XSD_HEXBINARY: Self = Self(115);
    pub const XSD_BASE64BINARY: Self = Self(116);
    pub const XSD_ANYURI: Self = Self(117);
    pub const XSD_INTEGER: Self = Self(131);
    pub const XSD_LONG: Self = Self(134);
    pub const XSD_INT: Self = Self(135);
    pub const XSD_ANYTYPE: Self = Self(145);
    pub const XSD_ANYXML: Self = Self(147);
    pub const SOAP_ENC_ARRAY: Self = Self(300);
    pub const SOAP_ENC_OBJECT: Self = Self(301);

    /// Resolve an encoding constant by name (`XSD_STRING`) or numeric text.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Ok(code) = name.parse::<u32>() {
            return Some(Self(code));
        }
        ENCODINGS
            .iter()
            .find(|(constant, _)| constant.eq_ignore_ascii_case(name))
            .map(|(_, code)| Self(*code))
    }

    /// Constant name, if this is a known code.
    pub fn name(&self) -> Option<&'static str> {
        ENCODINGS
            .iter()
            .find(|(_, code)| *code == self.0)
            .map(|(constant, _)| *constant)
    }

    /// Encoding implied by the runtime type of `data`.
    pub fn infer(data: &Value) -> Self {
        match data {
            Value::Array(_) => Self::SOAP_ENC_ARRAY,
            Value::Object(_) => Self::SOAP_ENC_OBJECT,
            Value::Bool(_) => Self::XSD_BOOLEAN,
            Value::Number(n) if n.is_f64() => Self::XSD_DOUBLE,
            Value::Number(_) => Self::XSD_INTEGER,
            Value::String(_) => Self::XSD_STRING,
            Value::Null => Self::XSD_ANYTYPE,
        }
    }
}

/// Encoding constants understood in payloads and client options.
pub(crate) const ENCODINGS: &[(&str, u32)] = &[
    ("XSD_STRING", 101),
    ("XSD_BOOLEAN", 102),
    ("XSD_DECIMAL", 103),
    ("XSD_FLOAT", 104),
    ("XSD_DOUBLE", 105),
    ("XSD_DURATION", 106),
    ("XSD_DATETIME", 107),
    ("XSD_TIME", 108),
    ("XSD_DATE", 109),
    ("XSD_GYEARMONTH", 110),
    ("XSD_GYEAR", 111),
    ("XSD_GMONTHDAY", 112),
    ("XSD_GDAY", 113),
    ("XSD_GMONTH", 114),
    ("XSD_HEXBINARY", 115),
    ("XSD_BASE64BINARY", 116),
    ("XSD_ANYURI", 117),
    ("XSD_QNAME", 118),
    ("XSD_NOTATION", 119),
    ("XSD_NORMALIZEDSTRING", 120),
    ("XSD_TOKEN", 121),
    ("XSD_LANGUAGE", 122),
    ("XSD_NMTOKEN", 123),
    ("XSD_NAME", 124),
    ("XSD_NCNAME", 125),
    ("XSD_ID", 126),
    ("XSD_IDREF", 127),
    ("XSD_IDREFS", 128),
    ("XSD_ENTITY", 129),
    ("XSD_ENTITIES", 130),
    ("XSD_INTEGER", 131),
    ("XSD_NONPOSITIVEINTEGER", 132),
    ("XSD_NEGATIVEINTEGER", 133),
    ("XSD_LONG", 134),
    ("XSD_INT", 135),
    ("XSD_SHORT", 136),
    ("XSD_BYTE", 137),
    ("XSD_NONNEGATIVEINTEGER", 138),
    ("XSD_UNSIGNEDLONG", 139),
    ("XSD_UNSIGNEDINT", 140),
    ("XSD_UNSIGNEDSHORT", 141),
    ("XSD_UNSIGNEDBYTE", 142),
    ("XSD_POSITIVEINTEGER", 143),
    ("XSD_NMTOKENS", 144),
    ("XSD_ANYTYPE", 145),
    ("XSD_ANYXML", 147),
    ("APACHE_MAP", 200),
    ("SOAP_ENC_ARRAY", 300),
    ("SOAP_ENC_OBJECT", 301),
];

/// An explicitly-typed wire value.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub data: Value,
    pub encoding: Encoding,
    pub type_name: Option<String>,
    pub type_namespace: Option<String>,
    pub node_name: Option<String>,
    pub node_namespace: Option<String>,
}

impl TypedValue {
    /// Build from the object stored under the reserved key.
    pub fn from_spec(spec: &Map<String, Value>) -> Self {
        let data = lookup(spec, &["data"]).cloned().unwrap_or(Value::Null);

        let encoding = match lookup(spec, &["encoding"]) {
            None | Some(Value::Null) => Encoding::infer(&data),
            Some(Value::Number(n)) => match n.as_u64().and_then(|c| u32::try_from(c).ok()) {
                Some(code) => Encoding(code),
                None => {
                    warn!(encoding = %n, "Invalid numeric encoding, inferring from data");
                    Encoding::infer(&data)
                }
            },
            Some(Value::String(name)) => Encoding::from_name(name).unwrap_or_else(|| {
                warn!(encoding = %name, "Unknown encoding constant, inferring from data");
                Encoding::infer(&data)
            }),
            Some(other) => {
                warn!(encoding = %other, "Unsupported encoding value, inferring from data");
                Encoding::infer(&data)
            }
        };

        let text = |keys: &[&str]| lookup(spec, keys).and_then(Value::as_str).map(str::to_string);

        Self {
            encoding,
            type_name: text(&["type_name", "typeName"]),
            type_namespace: text(&["type_namespace", "typeNamespace"]),
            node_name: text(&["node_name", "nodeName"]),
            node_namespace: text(&["node_namespace", "nodeNamespace"]),
            data,
        }
    }
}

fn lookup<'a>(spec: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| spec.get(*key))
}

/// Payload handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<SoapValue>),
    /// Entries in caller order
    Map(Vec<(String, SoapValue)>),
    Typed(TypedValue),
}

impl SoapValue {
    /// True when no typed leaf appears anywhere in the value.
    pub fn is_plain(&self) -> bool {
        match self {
            Self::Typed(_) => false,
            Self::Array(items) => items.iter().all(Self::is_plain),
            Self::Map(entries) => entries.iter().all(|(_, v)| v.is_plain()),
            _ => true,
        }
    }

    /// Field of a map value.
    pub fn get(&self, key: &str) -> Option<&SoapValue> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Rewrite a caller payload into a transport payload.
///
/// Works on a copy; the caller's value is never touched.
pub fn marshal(payload: &Value) -> SoapValue {
    match payload {
        Value::Null => SoapValue::Null,
        Value::Bool(b) => SoapValue::Bool(*b),
        Value::Number(n) => SoapValue::Number(n.clone()),
        Value::String(s) => SoapValue::String(s.clone()),
        Value::Array(items) => SoapValue::Array(items.iter().map(marshal).collect()),
        Value::Object(map) => {
            let typed = map.iter().find_map(|(key, value)| match value {
                Value::Object(spec) if key.eq_ignore_ascii_case(TYPED_VALUE_KEY) => Some(spec),
                _ => None,
            });
            match typed {
                Some(spec) => SoapValue::Typed(TypedValue::from_spec(spec)),
                None => SoapValue::Map(
                    map.iter()
                        .map(|(key, value)| (key.clone(), marshal(value)))
                        .collect(),
                ),
            }
        }
    }
}

/// Flatten a remote result graph into plain JSON.
pub fn unmarshal(value: RemoteValue) -> Value {
    match value {
        RemoteValue::Null => Value::Null,
        RemoteValue::Bool(b) => Value::Bool(b),
        RemoteValue::Int(i) => Value::from(i),
        RemoteValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        RemoteValue::String(s) => Value::String(s),
        RemoteValue::Array(items) => Value::Array(items.into_iter().map(unmarshal).collect()),
        RemoteValue::Object { fields, .. } => Value::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name, unmarshal(value)))
                .collect(),
        ),
    }
}
