//! Function catalog: WSDL-declared operations joined to their types.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::parser::parse_function_signature;
use crate::types::{TypeCatalog, TypeShape};

/// One declared remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Name as declared, original casing
    pub name: String,
    pub description: Option<String>,
    pub request_type: Option<String>,
    pub response_type: String,
    /// Shape of `request_type`, if the catalog declares it
    pub request_fields: Option<TypeShape>,
    /// Shape of `response_type`, if the catalog declares it
    pub response_fields: Option<TypeShape>,
}

impl FunctionDescriptor {
    /// Listing representation with flattened field schemas.
    pub fn summary(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "requestType": self.request_type,
            "requestFields": self.request_fields.as_ref().map(TypeShape::schema),
            "responseType": self.response_type,
            "responseFields": self.response_fields.as_ref().map(TypeShape::schema),
        })
    }
}

/// Operations of one service, indexed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCatalog {
    functions: BTreeMap<String, FunctionDescriptor>,
}

impl FunctionCatalog {
    /// Build the catalog from raw signatures, joining against `types`.
    ///
    /// `describe` supplies optional documentation per operation name.
    pub fn build<S, D>(signatures: &[S], types: &TypeCatalog, describe: D) -> Self
    where
        S: AsRef<str>,
        D: Fn(&str) -> Option<String>,
    {
        let mut functions: BTreeMap<String, FunctionDescriptor> = BTreeMap::new();

        for signature in signatures {
            let signature = signature.as_ref();
            let Some(parsed) = parse_function_signature(signature) else {
                debug!(signature = %signature, "Skipping unparseable function signature");
                continue;
            };

            let fields_of = |name: &str| types.get(name).map(|t| t.shape.clone());
            let descriptor = FunctionDescriptor {
                description: describe(&parsed.name),
                request_fields: parsed.request_type.as_deref().and_then(fields_of),
                response_fields: fields_of(&parsed.response_type),
                name: parsed.name,
                request_type: parsed.request_type,
                response_type: parsed.response_type,
            };

            match functions.entry(descriptor.name.to_lowercase()) {
                Entry::Vacant(slot) => {
                    slot.insert(descriptor);
                }
                Entry::Occupied(mut slot) => {
                    // Case-only collision: keep the lexicographically smallest
                    // name so the outcome does not depend on declaration order.
                    let existing = &slot.get().name;
                    warn!(
                        existing = %existing,
                        colliding = %descriptor.name,
                        "Operation names differ only by case"
                    );
                    if descriptor.name < *existing {
                        slot.insert(descriptor);
                    }
                }
            }
        }

        Self { functions }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(&name.to_lowercase())
    }

    /// Declared name for a case-insensitive match.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        self.get(name).map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Descriptors ordered by lower-cased name.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.functions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> TypeCatalog {
        TypeCatalog::build(&[
            "struct Address { string street; string city; }",
            "struct GetAddressResponse { Address result; }",
            "struct GetUser { string id; }",
        ])
    }

    fn no_docs(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_join_against_types() {
        let catalog = FunctionCatalog::build(
            &[
                "GetAddressResponse GetAddress(string id)",
                "GetUserResponse GetUser(GetUser parameters)",
            ],
            &types(),
            no_docs,
        );

        let address = catalog.get("GetAddress").unwrap();
        assert_eq!(address.request_type.as_deref(), Some("string"));
        assert!(address.request_fields.is_none());
        assert!(matches!(address.response_fields, Some(TypeShape::Object(_))));

        let user = catalog.get("getuser").unwrap();
        assert!(user.request_fields.is_some());
        assert!(user.response_fields.is_none());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let catalog = FunctionCatalog::build(&["R GetUser(Q q)"], &types(), no_docs);
        for name in ["GetUser", "getuser", "GETUSER"] {
            assert_eq!(catalog.resolve_name(name), Some("GetUser"));
        }
        assert!(catalog.get("GetUsers").is_none());
    }

    #[test]
    fn test_order_independent_and_sorted() {
        let forward = ["R Zeta(Q q)", "R alpha(Q q)", "R Beta(Q q)"];
        let backward = ["R Beta(Q q)", "R alpha(Q q)", "R Zeta(Q q)"];
        let a = FunctionCatalog::build(&forward, &types(), no_docs);
        let b = FunctionCatalog::build(&backward, &types(), no_docs);
        assert_eq!(a, b);

        let names: Vec<_> = a.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Beta", "Zeta"]);
    }

    #[test]
    fn test_case_collision_tie_break_is_deterministic() {
        let a = FunctionCatalog::build(&["R getUser(Q q)", "R GetUser(Q q)"], &types(), no_docs);
        let b = FunctionCatalog::build(&["R GetUser(Q q)", "R getUser(Q q)"], &types(), no_docs);
        assert_eq!(a.len(), 1);
        assert_eq!(a.resolve_name("GETUSER"), Some("GetUser"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_descriptions_and_summary() {
        let catalog = FunctionCatalog::build(
            &["GetAddressResponse GetAddress(string id)", "not a signature"],
            &types(),
            |name| Some(format!("Calls {}", name)),
        );
        assert_eq!(catalog.len(), 1);

        let summary = catalog.get("getaddress").unwrap().summary();
        assert_eq!(summary["description"], "Calls GetAddress");
        assert_eq!(summary["requestType"], "string");
        assert_eq!(summary["requestFields"], Value::Null);
        assert_eq!(
            summary["responseFields"]["properties"]["result"]["$ref"],
            "#/components/schemas/Address"
        );
    }
}
