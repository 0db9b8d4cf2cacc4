//! API documentation fragments for a SOAP service.
//!
//! Produces path, request body, response and schema entries that a REST
//! layer can merge into a larger OpenAPI document.

use serde_json::{json, Map, Value};

use crate::cache::Schema;
use crate::functions::FunctionCatalog;
use crate::types::{TypeCatalog, SCHEMA_REF_PREFIX};

/// Key wrapping resource lists in REST responses.
pub const RESOURCE_WRAPPER: &str = "resource";

const REQUEST_BODY_REF_PREFIX: &str = "#/components/requestBodies/";
const RESPONSE_REF_PREFIX: &str = "#/components/responses/";
const LIST_RESPONSE: &str = "SoapResponse";
const METHOD_MODEL: &str = "SoapMethods";

/// `my_service` / `my-service` -> `MyService`.
pub fn camelize(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn paths(service: &str, functions: &FunctionCatalog) -> Map<String, Value> {
    let capitalized = camelize(service);
    let mut paths = Map::new();
    paths.insert(
        "/".to_string(),
        json!({
            "get": {
                "summary": "Get resources for this service.",
                "operationId": format!("get{}Resources", capitalized),
                "description": "Return an array of the resources available.",
                "responses": {
                    "200": { "$ref": format!("{}{}", RESPONSE_REF_PREFIX, LIST_RESPONSE) }
                },
            }
        }),
    );

    for function in functions.iter() {
        let mut post = json!({
            "summary": format!("call the {} operation.", function.name),
            "description": function.description.clone().unwrap_or_default(),
            "operationId": format!("call{}{}", capitalized, function.name),
            "responses": {
                "200": { "$ref": format!("{}{}", RESPONSE_REF_PREFIX, function.response_type) }
            },
        });
        if let Some(request_type) = &function.request_type {
            post["requestBody"] = json!({ "$ref": format!("{}{}", REQUEST_BODY_REF_PREFIX, request_type) });
        }
        paths.insert(format!("/{}", function.name), json!({ "post": post }));
    }

    paths
}

fn json_and_xml(type_name: &str) -> Value {
    let schema = json!({ "$ref": format!("{}{}", SCHEMA_REF_PREFIX, type_name) });
    json!({
        "application/json": { "schema": schema.clone() },
        "application/xml": { "schema": schema },
    })
}

pub fn request_bodies(functions: &FunctionCatalog) -> Map<String, Value> {
    functions
        .iter()
        .filter_map(|function| function.request_type.as_deref())
        .map(|request_type| {
            let body = json!({
                "description": format!("{} Request", request_type),
                "content": json_and_xml(request_type),
            });
            (request_type.to_string(), body)
        })
        .collect()
}

pub fn responses(functions: &FunctionCatalog) -> Map<String, Value> {
    let mut responses = Map::new();
    responses.insert(
        LIST_RESPONSE.to_string(),
        json!({ "description": "SOAP Response", "content": json_and_xml(LIST_RESPONSE) }),
    );
    for function in functions.iter() {
        let response_type = &function.response_type;
        responses.insert(
            response_type.clone(),
            json!({
                "description": format!("{} Response", response_type),
                "content": json_and_xml(response_type),
            }),
        );
    }
    responses
}

/// Listing models followed by every declared type.
pub fn schemas(types: &TypeCatalog) -> Map<String, Value> {
    let mut schemas = Map::new();
    schemas.insert(
        LIST_RESPONSE.to_string(),
        json!({
            "type": "object",
            "properties": {
                RESOURCE_WRAPPER: {
                    "type": "array",
                    "description": "Array of operation records.",
                    "items": { "$ref": format!("{}{}", SCHEMA_REF_PREFIX, METHOD_MODEL) },
                }
            },
        }),
    );
    schemas.insert(
        METHOD_MODEL.to_string(),
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Operation name." },
                "description": { "type": "string", "description": "Operation documentation, if any." },
                "requestType": { "type": "string", "description": "Name of the request type." },
                "requestFields": { "type": "object", "description": "Schema of the request type." },
                "responseType": { "type": "string", "description": "Name of the response type." },
                "responseFields": { "type": "object", "description": "Schema of the response type." },
                "access": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "An array of verbs allowed.",
                },
            },
        }),
    );
    schemas.extend(types.schemas());
    schemas
}

/// Everything above, assembled.
pub fn document(service: &str, schema: &Schema) -> Value {
    json!({
        "paths": paths(service, &schema.functions),
        "components": {
            "requestBodies": request_bodies(&schema.functions),
            "responses": responses(&schema.functions),
            "schemas": schemas(&schema.types),
        },
    })
}
