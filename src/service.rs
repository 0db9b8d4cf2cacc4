//! REST-facing surface of one SOAP service.
//!
//! Routing, permissions and response shaping belong to the surrounding REST
//! layer; this module only answers the questions it asks: which resources
//! exist, what a GET or POST on one of them returns, and when to forget
//! the cached schema.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::apidoc::{self, RESOURCE_WRAPPER};
use crate::cache::{CacheStore, Schema, SchemaCache};
use crate::client::SoapClient;
use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::transport::TransportFactory;

/// REST verbs a resource may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller permissions, consulted when listing resources.
pub trait AccessPolicy {
    /// Verbs the caller may use on `resource`; empty hides it.
    fn allowed_verbs(&self, service: &str, resource: &str) -> Vec<Verb>;
}

/// Policy granting GET and POST on every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn allowed_verbs(&self, _service: &str, _resource: &str) -> Vec<Verb> {
        vec![Verb::Get, Verb::Post]
    }
}

/// One configured SOAP service.
pub struct SoapService {
    name: String,
    client: SoapClient,
    cache: SchemaCache,
}

impl SoapService {
    pub fn new(name: impl Into<String>, client: SoapClient) -> Self {
        let name = name.into();
        let cache = SchemaCache::new(name.clone());
        Self {
            name,
            client,
            cache,
        }
    }

    /// Connect using `config`; `store` is used only when caching is enabled.
    pub fn from_config(
        name: impl Into<String>,
        config: &GatewayConfig,
        factory: &dyn TransportFactory,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        let client = SoapClient::connect(config, factory)?;
        let mut service = Self::new(name, client);
        if let Some(store) = store.filter(|_| config.cache_enabled) {
            service = service.with_cache_store(store, Duration::from_secs(config.cache_ttl));
        }
        info!(service = %service.name, cache = config.cache_enabled, "SOAP service ready");
        Ok(service)
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        self.cache = SchemaCache::new(self.name.clone()).with_store(store, ttl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &SoapClient {
        &self.client
    }

    /// Cached schema, rebuilt when `refresh` is set or nothing is cached.
    pub fn schema(&self, refresh: bool) -> Result<Arc<Schema>> {
        self.cache.get_or_build(refresh, self.client.transport())
    }

    /// Flattened schema fragment per declared type.
    pub fn types(&self, refresh: bool) -> Result<Map<String, Value>> {
        Ok(self.schema(refresh)?.types.schemas())
    }

    /// Declared name of `name`, matched case-insensitively.
    pub fn resolve_operation(&self, name: &str) -> Result<Option<String>> {
        let schema = self.schema(false)?;
        Ok(schema.functions.resolve_name(name).map(str::to_string))
    }

    pub fn does_operation_exist(&self, name: &str) -> Result<bool> {
        Ok(self.resolve_operation(name)?.is_some())
    }

    /// Operations visible to the caller, each with its allowed verbs.
    pub fn list_resources(&self, refresh: bool, policy: &dyn AccessPolicy) -> Result<Vec<Value>> {
        let schema = self.schema(refresh)?;
        let resources = schema
            .functions
            .iter()
            .filter_map(|function| {
                let verbs = policy.allowed_verbs(&self.name, &function.name);
                if verbs.is_empty() {
                    return None;
                }
                let mut resource = function.summary();
                resource["access"] = json!(verbs);
                Some(resource)
            })
            .collect();
        Ok(resources)
    }

    /// Invoke an operation with a payload.
    pub fn call(&self, operation: &str, payload: &Value) -> Result<Value> {
        let schema = self.schema(false)?;
        Dispatcher::new(&self.name, self.client.transport(), schema.operations()).call(operation, payload)
    }

    /// Serve a REST request on `resource` (empty for the service root).
    ///
    /// GET on the root lists resources; GET on a resource calls it with the
    /// query parameters, POST with the body.
    pub fn handle(
        &self,
        verb: Verb,
        resource: &str,
        payload: &Value,
        refresh: bool,
        policy: &dyn AccessPolicy,
    ) -> Result<Value> {
        let resource = resource.trim_matches('/');
        debug!(service = %self.name, verb = %verb, resource = %resource, "Handling request");

        match (verb, resource.is_empty()) {
            (Verb::Get, true) => Ok(json!({ RESOURCE_WRAPPER: self.list_resources(refresh, policy)? })),
            (Verb::Get, false) | (Verb::Post, false) => self.call(resource, payload),
            (Verb::Post, true) => Err(GatewayError::InvalidArgument(
                "POST on the service root is not supported".to_string(),
            )),
            (other, _) => Err(GatewayError::InvalidArgument(format!(
                "{} is not supported by SOAP services",
                other
            ))),
        }
    }

    /// Forget the cached schema; the next request rebuilds it.
    pub fn refresh_schema(&self) {
        info!(service = %self.name, "Refreshing SOAP schema");
        self.cache.invalidate();
    }

    /// Documentation fragments for this service.
    pub fn api_doc(&self) -> Result<Value> {
        let schema = self.schema(false)?;
        Ok(apidoc::document(&self.name, &schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientOptions, Endpoint};
    use crate::headers::SoapHeader;
    use crate::payload::SoapValue;
    use crate::transport::{RemoteValue, SoapTransport, TransportError};
    use std::sync::Mutex;

    /// Answers every call with the operation name and records it.
    #[derive(Clone, Default)]
    struct Echo {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl SoapTransport for Echo {
        fn function_signatures(&self) -> std::result::Result<Vec<String>, TransportError> {
            Ok(vec![
                "GetUserResponse GetUser(string id)".to_string(),
                "DeleteUserResponse DeleteUser(string id)".to_string(),
            ])
        }

        fn type_declarations(&self) -> std::result::Result<Vec<String>, TransportError> {
            Ok(vec![
                "struct GetUserResponse { string name; }".to_string(),
                "struct DeleteUserResponse { boolean done; }".to_string(),
            ])
        }

        fn invoke(
            &self,
            operation: &str,
            _payload: SoapValue,
        ) -> std::result::Result<RemoteValue, TransportError> {
            self.calls.lock().unwrap().push(operation.to_string());
            Ok(RemoteValue::String(operation.to_string()))
        }

        fn set_headers(&mut self, _headers: Vec<SoapHeader>) {}
    }

    struct EchoFactory(Echo);

    impl TransportFactory for EchoFactory {
        fn connect(
            &self,
            _endpoint: &Endpoint,
            _options: &ClientOptions,
        ) -> std::result::Result<Box<dyn SoapTransport>, TransportError> {
            Ok(Box::new(self.0.clone()))
        }
    }

    struct GetOnly;

    impl AccessPolicy for GetOnly {
        fn allowed_verbs(&self, _service: &str, resource: &str) -> Vec<Verb> {
            if resource.starts_with("Get") {
                vec![Verb::Get]
            } else {
                Vec::new()
            }
        }
    }

    fn users() -> (SoapService, Echo) {
        let echo = Echo::default();
        let config = GatewayConfig::from_yaml_str("wsdl: http://users.example.org/?wsdl").unwrap();
        let service = SoapService::from_config("users", &config, &EchoFactory(echo.clone()), None).unwrap();
        (service, echo)
    }

    #[test]
    fn test_verb_names() {
        assert_eq!(Verb::Get.as_str(), "GET");
        assert_eq!(Verb::Patch.to_string(), "PATCH");
        assert_eq!(serde_json::to_value(Verb::Delete).unwrap(), json!("DELETE"));
        assert_eq!(serde_json::from_value::<Verb>(json!("PUT")).unwrap(), Verb::Put);
    }

    #[test]
    fn test_list_resources_applies_policy() {
        let (service, _echo) = users();

        let all = service.list_resources(false, &AllowAll).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r["access"] == json!(["GET", "POST"])));

        let visible = service.list_resources(false, &GetOnly).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0]["name"], "GetUser");
        assert_eq!(visible[0]["access"], json!(["GET"]));
    }

    #[test]
    fn test_handle_routes_by_verb_and_resource() {
        let (service, echo) = users();

        let root = service.handle(Verb::Get, "", &Value::Null, false, &AllowAll).unwrap();
        assert_eq!(root[RESOURCE_WRAPPER].as_array().unwrap().len(), 2);

        let got = service.handle(Verb::Get, "/getuser/", &json!({"id": "1"}), false, &AllowAll).unwrap();
        assert_eq!(got, json!("GetUser"));
        let posted = service.handle(Verb::Post, "DeleteUser", &json!({"id": "1"}), false, &AllowAll).unwrap();
        assert_eq!(posted, json!("DeleteUser"));

        let err = service.handle(Verb::Post, "/", &json!({}), false, &AllowAll).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        for verb in [Verb::Put, Verb::Patch, Verb::Delete] {
            let err = service.handle(verb, "GetUser", &json!({}), false, &AllowAll).unwrap_err();
            assert_eq!(err.status_code(), 400);
        }

        assert_eq!(*echo.calls.lock().unwrap(), vec!["GetUser", "DeleteUser"]);
    }

    #[test]
    fn test_operation_lookup_and_refresh() {
        let (service, _echo) = users();

        assert_eq!(service.resolve_operation("GETUSER").unwrap().as_deref(), Some("GetUser"));
        assert!(service.does_operation_exist("deleteuser").unwrap());
        assert!(!service.does_operation_exist("CreateUser").unwrap());

        let before = service.schema(false).unwrap();
        service.refresh_schema();
        let after = service.schema(false).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(service.types(false).unwrap().contains_key("GetUserResponse"));
    }

    #[test]
    fn test_api_doc_names_service_operations() {
        let (service, _echo) = users();

        let doc = service.api_doc().unwrap();

        assert_eq!(doc["paths"]["/"]["get"]["operationId"], "getUsersResources");
        assert!(doc["paths"].get("/GetUser").is_some());
        assert!(doc["components"]["schemas"].get("GetUserResponse").is_some());
    }
}
