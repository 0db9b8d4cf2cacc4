//! Operation dispatch.
//!
//! Names resolve case-insensitively against an [`OperationTable`] derived
//! from the cached function catalog. Each entry closes over the transport's
//! call-by-name primitive, so nothing is looked up reflectively.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::functions::FunctionCatalog;
use crate::payload::{marshal, unmarshal, SoapValue};
use crate::transport::{RemoteValue, SoapTransport, TransportError};

/// Invocation descriptor for one remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Declared name, as sent on the wire
    pub name: String,
    pub request_type: Option<String>,
    pub response_type: String,
}

impl Operation {
    pub fn invoke(
        &self,
        transport: &dyn SoapTransport,
        payload: SoapValue,
    ) -> std::result::Result<RemoteValue, TransportError> {
        transport.invoke(&self.name, payload)
    }
}

/// Operations keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationTable {
    operations: BTreeMap<String, Operation>,
}

impl OperationTable {
    pub fn from_catalog(functions: &FunctionCatalog) -> Self {
        let operations = functions
            .iter()
            .map(|function| {
                let operation = Operation {
                    name: function.name.clone(),
                    request_type: function.request_type.clone(),
                    response_type: function.response_type.clone(),
                };
                (function.name.to_lowercase(), operation)
            })
            .collect();
        Self { operations }
    }

    pub fn resolve(&self, name: &str) -> Option<&Operation> {
        self.operations.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Calls operations of one service through its transport.
pub struct Dispatcher<'a> {
    service: &'a str,
    transport: &'a dyn SoapTransport,
    operations: &'a OperationTable,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        service: &'a str,
        transport: &'a dyn SoapTransport,
        operations: &'a OperationTable,
    ) -> Self {
        Self {
            service,
            transport,
            operations,
        }
    }

    /// Invoke `name` with `payload` and return the plain result.
    ///
    /// Unknown names fail before the transport is touched.
    pub fn call(&self, name: &str, payload: &Value) -> Result<Value> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "operation name must not be empty".to_string(),
            ));
        }

        let operation = self
            .operations
            .resolve(name)
            .ok_or_else(|| GatewayError::OperationNotFound(name.to_string()))?;

        let payload = marshal(payload);
        debug!(
            service = %self.service,
            operation = %operation.name,
            typed_values = !payload.is_plain(),
            "Invoking SOAP operation"
        );

        match operation.invoke(self.transport, payload) {
            Ok(result) => {
                self.log_exchange("last");
                Ok(unmarshal(result))
            }
            Err(err) => {
                self.log_exchange("failed");
                let err = GatewayError::from(err);
                warn!(
                    service = %self.service,
                    operation = %operation.name,
                    status = err.status_code(),
                    error = %err,
                    "SOAP operation failed"
                );
                Err(err)
            }
        }
    }

    fn log_exchange(&self, outcome: &str) {
        let Some(exchange) = self.transport.last_exchange() else {
            return;
        };
        debug!(
            service = %self.service,
            request = exchange.request.as_deref().unwrap_or_default(),
            request_headers = exchange.request_headers.as_deref().unwrap_or_default(),
            "{} SOAP request", outcome
        );
        debug!(
            service = %self.service,
            response = exchange.response.as_deref().unwrap_or_default(),
            response_headers = exchange.response_headers.as_deref().unwrap_or_default(),
            "{} SOAP response", outcome
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::SoapHeader;
    use crate::payload::Encoding;
    use crate::transport::RemoteFault;
    use crate::types::TypeCatalog;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, SoapValue)>>,
        outcome: Option<TransportError>,
    }

    impl SoapTransport for Recorder {
        fn function_signatures(&self) -> std::result::Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        fn type_declarations(&self) -> std::result::Result<Vec<String>, TransportError> {
            Ok(Vec::new())
        }

        fn invoke(
            &self,
            operation: &str,
            payload: SoapValue,
        ) -> std::result::Result<RemoteValue, TransportError> {
            self.calls.lock().unwrap().push((operation.to_string(), payload));
            match &self.outcome {
                Some(err) => Err(err.clone()),
                None => Ok(RemoteValue::from(json!({"ok": true}))),
            }
        }

        fn set_headers(&mut self, _headers: Vec<SoapHeader>) {}
    }

    fn table() -> OperationTable {
        let functions = FunctionCatalog::build(
            &["GetUserResponse GetUser(GetUser parameters)"],
            &TypeCatalog::default(),
            |_: &str| None,
        );
        OperationTable::from_catalog(&functions)
    }

    #[test]
    fn test_resolves_case_insensitively_to_declared_name() {
        let transport = Recorder::default();
        let table = table();
        let dispatcher = Dispatcher::new("users", &transport, &table);

        for name in ["GetUser", "getuser", "GETUSER"] {
            assert_eq!(dispatcher.call(name, &json!({})).unwrap(), json!({"ok": true}));
        }
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(name, _)| name == "GetUser"));
    }

    #[test]
    fn test_unknown_and_empty_names_never_reach_transport() {
        let transport = Recorder::default();
        let table = table();
        let dispatcher = Dispatcher::new("users", &transport, &table);

        let err = dispatcher.call("DeleteUser", &json!({})).unwrap_err();
        assert!(matches!(err, GatewayError::OperationNotFound(ref n) if n == "DeleteUser"));
        assert_eq!(err.status_code(), 404);

        let err = dispatcher.call("  ", &json!({})).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));

        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_typed_leaf_is_rewritten_on_a_copy() {
        let transport = Recorder::default();
        let table = table();
        let dispatcher = Dispatcher::new("users", &transport, &table);
        let payload = json!({"amount": {"soapvar": {"data": 3.5}}});

        dispatcher.call("GetUser", &payload).unwrap();

        assert_eq!(payload, json!({"amount": {"soapvar": {"data": 3.5}}}));
        let calls = transport.calls.lock().unwrap();
        match calls[0].1.get("amount") {
            Some(SoapValue::Typed(typed)) => assert_eq!(typed.encoding, Encoding::XSD_DOUBLE),
            other => panic!("expected typed value, got {:?}", other),
        }
    }

    #[test]
    fn test_faults_are_mapped() {
        let table = table();

        let numeric = Recorder {
            outcome: Some(TransportError::Fault(RemoteFault::new("42", "answer"))),
            ..Default::default()
        };
        let err = Dispatcher::new("users", &numeric, &table)
            .call("GetUser", &json!({}))
            .unwrap_err();
        assert_eq!(err.status_code(), 42);
        assert_eq!(err.to_string(), "answer [Fault code:42]");

        let qualified = Recorder {
            outcome: Some(TransportError::Fault(RemoteFault::new("Server.Timeout", "slow"))),
            ..Default::default()
        };
        let err = Dispatcher::new("users", &qualified, &table)
            .call("GetUser", &json!({}))
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_timeout_stays_distinct() {
        let table = table();
        let transport = Recorder {
            outcome: Some(TransportError::Timeout("GetUser".to_string())),
            ..Default::default()
        };
        let err = Dispatcher::new("users", &transport, &table)
            .call("GetUser", &json!({}))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
        assert_eq!(err.status_code(), 504);
    }
}
