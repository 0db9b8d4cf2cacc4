//! SOAP to REST gateway core for Zentinel
//!
//! Turns a SOAP service's introspection output into typed catalogs, caches
//! them per service, and dispatches REST-style calls to remote operations by
//! name.
//!
//! # Features
//!
//! - Type catalog with scalar mapping, arrays, aliases and cyclic structs
//! - Case-insensitive function catalog joined to request/response types
//! - Per-service schema cache with refresh, invalidation and an optional store
//! - Payload marshaling with explicitly-typed (`soapvar`) leaves
//! - Fault code to HTTP status mapping
//! - WSSE UsernameToken and generic SOAP headers
//! - NTLM stream shim scoped to client construction
//! - API documentation fragments
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_gateway::{AllowAll, GatewayConfig, SoapService};
//!
//! let config = GatewayConfig::from_file("crm.yaml")?;
//! let service = SoapService::from_config("crm", &config, &factory, None)?;
//! let resources = service.list_resources(false, &AllowAll)?;
//! let user = service.call("GetUser", &serde_json::json!({"id": "42"}))?;
//! ```

pub mod apidoc;
pub mod cache;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod functions;
pub mod headers;
pub mod ntlm;
pub mod parser;
pub mod payload;
pub mod service;
pub mod stream;
pub mod transport;
pub mod types;

pub use cache::{CacheStore, MemoryCacheStore, Schema, SchemaCache};
pub use client::SoapClient;
pub use config::{Endpoint, GatewayConfig, HeaderSpec};
pub use dispatcher::{Dispatcher, Operation, OperationTable};
pub use error::{GatewayError, Result};
pub use functions::{FunctionCatalog, FunctionDescriptor};
pub use service::{AccessPolicy, AllowAll, SoapService, Verb};
pub use transport::{RemoteFault, RemoteValue, SoapTransport, TransportError, TransportFactory};
pub use types::{TypeCatalog, TypeDescriptor};
