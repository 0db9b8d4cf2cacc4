//! SOAP transport capability.
//!
//! The gateway does not speak SOAP on the wire itself. A transport built from
//! a WSDL (or a location/binding pair) enumerates the declared operations and
//! types and performs calls by operation name.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{ClientOptions, Endpoint};
use crate::headers::SoapHeader;
use crate::payload::SoapValue;

/// A fault signaled by the remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    /// Fault code, numeric or qualified string (`Server.Timeout`)
    pub code: String,
    /// Fault string
    pub message: String,
}

impl RemoteFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("SOAP fault {}: {}", .0.code, .0.message)]
    Fault(RemoteFault),

    #[error("call to '{0}' timed out")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unable to load service description: {0}")]
    Load(String),
}

/// Result object graph returned by a remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<RemoteValue>),
    /// A decoded object: its class name (if the transport knows one) and its
    /// fields in wire order.
    Object {
        class: Option<String>,
        fields: Vec<(String, RemoteValue)>,
    },
}

impl From<Value> for RemoteValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object {
                class: None,
                fields: map.into_iter().map(|(k, v)| (k, Self::from(v))).collect(),
            },
        }
    }
}

/// Snapshot of the last request/response exchanged by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchange {
    pub request: Option<String>,
    pub request_headers: Option<String>,
    pub response: Option<String>,
    pub response_headers: Option<String>,
}

/// A constructed SOAP client able to introspect and invoke operations.
pub trait SoapTransport: Send + Sync {
    /// Raw function signatures, e.g. `GetUserResponse GetUser(GetUser parameters)`.
    fn function_signatures(&self) -> Result<Vec<String>, TransportError>;

    /// Raw type declarations, e.g. `struct GetUser { string id; }`.
    fn type_declarations(&self) -> Result<Vec<String>, TransportError>;

    /// Optional documentation for an operation.
    fn operation_documentation(&self, _operation: &str) -> Option<String> {
        None
    }

    /// Invoke an operation by name.
    fn invoke(&self, operation: &str, payload: SoapValue) -> Result<RemoteValue, TransportError>;

    /// Replace the headers sent with every call.
    fn set_headers(&mut self, headers: Vec<SoapHeader>);

    /// Last exchange, for diagnostics only.
    fn last_exchange(&self) -> Option<Exchange> {
        None
    }
}

/// Builds transports from an endpoint description.
pub trait TransportFactory {
    fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ClientOptions,
    ) -> Result<Box<dyn SoapTransport>, TransportError>;
}

/// Introspection output captured from a live service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrospectionDump {
    pub functions: Vec<String>,
    pub types: Vec<String>,
}

impl IntrospectionDump {
    /// Load a dump from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Offline transport answering introspection from a dump.
///
/// Calls always fail with a connection error.
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    dump: IntrospectionDump,
    headers: Vec<SoapHeader>,
}

impl StaticTransport {
    pub fn new(dump: IntrospectionDump) -> Self {
        Self {
            dump,
            headers: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[SoapHeader] {
        &self.headers
    }
}

impl SoapTransport for StaticTransport {
    fn function_signatures(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.dump.functions.clone())
    }

    fn type_declarations(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.dump.types.clone())
    }

    fn invoke(&self, operation: &str, _payload: SoapValue) -> Result<RemoteValue, TransportError> {
        Err(TransportError::Connection(format!(
            "operation '{}' cannot be called on an introspection dump",
            operation
        )))
    }

    fn set_headers(&mut self, headers: Vec<SoapHeader>) {
        self.headers = headers;
    }
}
