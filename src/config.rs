//! Configuration types for the SOAP gateway.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};
use crate::ntlm::NtlmCredentials;
use crate::payload::ENCODINGS;

/// Option key holding stream context parameters (matched case-insensitively).
pub const STREAM_CONTEXT_OPTION: &str = "stream_context";

/// SOAP client option constants that may be given by name.
const CLIENT_CONSTANTS: &[(&str, i64)] = &[
    ("SOAP_1_1", 1),
    ("SOAP_1_2", 2),
    ("SOAP_RPC", 1),
    ("SOAP_DOCUMENT", 2),
    ("SOAP_ENCODED", 1),
    ("SOAP_LITERAL", 2),
    ("SOAP_PERSISTENCE_SESSION", 1),
    ("SOAP_PERSISTENCE_REQUEST", 2),
    ("SOAP_FUNCTIONS_ALL", 999),
    ("SOAP_AUTHENTICATION_BASIC", 0),
    ("SOAP_AUTHENTICATION_DIGEST", 1),
    ("SOAP_COMPRESSION_ACCEPT", 32),
    ("SOAP_COMPRESSION_GZIP", 0),
    ("SOAP_COMPRESSION_DEFLATE", 16),
    ("SOAP_SINGLE_ELEMENT_ARRAYS", 1),
    ("SOAP_WAIT_ONE_WAY_CALLS", 2),
    ("SOAP_USE_XSI_ARRAY_TYPE", 4),
    ("SOAP_SSL_METHOD_TLS", 0),
    ("SOAP_SSL_METHOD_SSLv2", 1),
    ("SOAP_SSL_METHOD_SSLv3", 2),
    ("SOAP_SSL_METHOD_SSLv23", 3),
    ("WSDL_CACHE_NONE", 0),
    ("WSDL_CACHE_DISK", 1),
    ("WSDL_CACHE_MEMORY", 2),
    ("WSDL_CACHE_BOTH", 3),
];

/// Numeric value of a named SOAP client or encoding constant.
pub fn resolve_constant(name: &str) -> Option<i64> {
    CLIENT_CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
        .or_else(|| {
            ENCODINGS
                .iter()
                .find(|(constant, _)| *constant == name)
                .map(|(_, code)| i64::from(*code))
        })
}

/// Main configuration for one SOAP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WSDL URI, file path, or bare file name inside `wsdl_storage_dir`
    pub wsdl: Option<String>,

    /// Endpoint location for non-WSDL mode
    pub location: Option<String>,

    /// Target namespace (binding URI) for non-WSDL mode
    pub uri: Option<String>,

    /// Transport options, passed through to the transport factory
    pub options: BTreeMap<String, Value>,

    /// SOAP headers sent with every call
    pub headers: Vec<HeaderSpec>,

    /// `wsu:Id` for the WSSE UsernameToken element
    pub wsse_username_token: Option<String>,

    /// NTLM credentials used while loading the service description
    pub ntlm_username: Option<String>,
    pub ntlm_password: Option<String>,

    /// Persist built schemas in the cache store
    pub cache_enabled: bool,

    /// Cache entry lifetime (seconds)
    pub cache_ttl: u64,

    /// Directory holding WSDL files referenced by bare name
    pub wsdl_storage_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            wsdl: None,
            location: None,
            uri: None,
            options: BTreeMap::new(),
            headers: Vec::new(),
            wsse_username_token: None,
            ntlm_username: None,
            ntlm_password: None,
            cache_enabled: false,
            cache_ttl: 300,
            wsdl_storage_dir: PathBuf::from("storage/wsdl"),
        }
    }
}

impl GatewayConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Where the service description comes from.
    pub fn endpoint(&self) -> Result<Endpoint> {
        if let Some(wsdl) = self.wsdl.as_deref().filter(|w| !w.trim().is_empty()) {
            return Ok(Endpoint::Wsdl(self.resolve_wsdl(wsdl.trim())));
        }

        match (self.setting("location", &self.location), self.setting("uri", &self.uri)) {
            (Some(location), Some(uri)) => Ok(Endpoint::Direct { location, uri }),
            _ => Err(GatewayError::Config(
                "SOAP Services require either a WSDL or both location and URI to be configured."
                    .to_string(),
            )),
        }
    }

    fn resolve_wsdl(&self, wsdl: &str) -> String {
        if !wsdl.contains('/') && !wsdl.contains('\\') {
            return self.wsdl_storage_dir.join(wsdl).to_string_lossy().into_owned();
        }
        match std::fs::canonicalize(wsdl) {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(_) => wsdl.to_string(),
        }
    }

    /// Top-level value, falling back to the same key inside `options`.
    fn setting(&self, key: &str, top_level: &Option<String>) -> Option<String> {
        top_level
            .clone()
            .or_else(|| self.options.get(key).and_then(Value::as_str).map(str::to_string))
            .filter(|value| !value.is_empty())
    }

    /// Normalized transport options.
    pub fn client_options(&self) -> Result<ClientOptions> {
        let mut values = BTreeMap::new();
        let mut stream_context = None;

        for (key, value) in &self.options {
            if key.eq_ignore_ascii_case(STREAM_CONTEXT_OPTION) {
                stream_context = Some(parse_stream_context(value)?);
                continue;
            }
            let value = match value {
                Value::String(name) => resolve_constant(name).map(Value::from).unwrap_or_else(|| value.clone()),
                other => other.clone(),
            };
            values.insert(key.clone(), value);
        }

        Ok(ClientOptions {
            values,
            stream_context,
        })
    }

    /// NTLM credentials, if configured at the top level or in `options`.
    pub fn ntlm_credentials(&self) -> Option<NtlmCredentials> {
        let username = self.setting("ntlm_username", &self.ntlm_username);
        let password = self.setting("ntlm_password", &self.ntlm_password);
        if username.is_none() && password.is_none() {
            return None;
        }
        Some(NtlmCredentials::new(
            username.unwrap_or_default(),
            password.unwrap_or_default(),
        ))
    }
}

fn parse_stream_context(value: &Value) -> Result<Map<String, Value>> {
    let parsed = match value {
        Value::String(text) => serde_json::from_str::<Value>(text)
            .or_else(|_| serde_json::from_str::<Value>(&strip_slashes(text)))
            .ok(),
        other => Some(other.clone()),
    };
    match parsed {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(GatewayError::Config(
            "SOAP Services stream_context must be a valid array (or JSON object) of parameters."
                .to_string(),
        )),
    }
}

/// Remove backslash escapes (`\"` becomes `"`, `\\` becomes `\`).
fn strip_slashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Source of the service description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Wsdl(String),
    /// Non-WSDL mode: endpoint location plus binding URI
    Direct { location: String, uri: String },
}

/// Transport options after constant resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOptions {
    pub values: BTreeMap<String, Value>,
    /// Parsed `stream_context` block
    pub stream_context: Option<Map<String, Value>>,
}

impl ClientOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Header entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeaderKind {
    #[default]
    Generic,
    Wsse,
}

/// One configured header entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSpec {
    #[serde(rename = "type")]
    pub kind: HeaderKind,
    pub namespace: Option<String>,
    pub name: Option<String>,
    /// JSON object, or a string holding one; WSSE entries hold plain text
    pub data: Option<Value>,
    #[serde(alias = "mustunderstand", alias = "mustUnderstand")]
    pub must_understand: bool,
    pub actor: Option<String>,
}

impl HeaderSpec {
    /// Data as plain text.
    pub fn data_text(&self) -> Option<String> {
        match self.data.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Data decoded to an object; anything else yields an empty map.
    pub fn data_map(&self) -> Map<String, Value> {
        let decoded = match &self.data {
            Some(Value::String(text)) => serde_json::from_str::<Value>(text)
                .or_else(|_| serde_json::from_str::<Value>(&strip_slashes(text)))
                .ok(),
            Some(other) => Some(other.clone()),
            None => None,
        };
        match decoded {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
