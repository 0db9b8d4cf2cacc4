//! Schema cache.
//!
//! A service keeps one [`Schema`] snapshot: both catalogs built together
//! from a single introspection pass, or nothing. Snapshots can additionally
//! be persisted in a [`CacheStore`] so a fresh service instance does not
//! need to introspect again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dispatcher::OperationTable;
use crate::error::{GatewayError, Result};
use crate::functions::FunctionCatalog;
use crate::transport::SoapTransport;
use crate::types::TypeCatalog;

/// Byte store for persisted snapshots.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration);

    fn remove(&self, key: &str);
}

/// In-process [`CacheStore`] with per-entry expiry.
///
/// A TTL too large to represent as an `Instant` never expires.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some((value, expires)) if expires.map_or(true, |at| at > now) => {
                    return Some(value.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.remove(key);
        None
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let expires = Instant::now().checked_add(ttl);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (value, expires));
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Both catalogs of one service, built from one introspection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub functions: FunctionCatalog,
    pub types: TypeCatalog,
    pub built_at: DateTime<Utc>,
    #[serde(skip)]
    operations: OperationTable,
}

impl Schema {
    pub fn new(functions: FunctionCatalog, types: TypeCatalog) -> Self {
        let operations = OperationTable::from_catalog(&functions);
        Self {
            functions,
            types,
            built_at: Utc::now(),
            operations,
        }
    }

    /// Introspect `transport`: types first, then functions joined to them.
    pub fn build(transport: &dyn SoapTransport) -> Result<Self> {
        let declarations = transport.type_declarations()?;
        let signatures = transport.function_signatures()?;
        let types = TypeCatalog::build(&declarations);
        let functions = FunctionCatalog::build(&signatures, &types, |operation| {
            transport.operation_documentation(operation)
        });
        Ok(Self::new(functions, types))
    }

    pub fn operations(&self) -> &OperationTable {
        &self.operations
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| GatewayError::Cache(err.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut schema: Self = serde_json::from_slice(bytes)?;
        schema.operations = OperationTable::from_catalog(&schema.functions);
        Ok(schema)
    }
}

/// Per-service schema holder with fetch-or-build semantics.
pub struct SchemaCache {
    service: String,
    slot: RwLock<Option<Arc<Schema>>>,
    /// Bumped by `invalidate`; a build started under an older epoch is
    /// returned to its caller but not installed.
    epoch: AtomicU64,
    /// Bumped by every completed build.
    generation: AtomicU64,
    build_lock: Mutex<()>,
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl SchemaCache {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            slot: RwLock::new(None),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            build_lock: Mutex::new(()),
            store: None,
            ttl: Duration::from_secs(300),
        }
    }

    /// Persist snapshots in `store` with the given lifetime.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        self.store = Some(store);
        self.ttl = ttl;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Store key for this service's snapshot.
    pub fn key(&self) -> String {
        format!("soap:{}:schema", self.service)
    }

    /// Current snapshot, if any.
    pub fn cached(&self) -> Option<Arc<Schema>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Return the cached snapshot, or build one from `transport`.
    ///
    /// Concurrent callers are serialized on the build; callers that waited
    /// while another build completed share its result instead of building
    /// again.
    pub fn get_or_build(&self, refresh: bool, transport: &dyn SoapTransport) -> Result<Arc<Schema>> {
        if !refresh {
            if let Some(schema) = self.cached() {
                debug!(service = %self.service, "Schema cache hit");
                return Ok(schema);
            }
        }

        let seen_generation = self.generation.load(Ordering::SeqCst);
        let _build = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let raced = self.generation.load(Ordering::SeqCst) != seen_generation;
        if !refresh || raced {
            if let Some(schema) = self.cached() {
                debug!(service = %self.service, "Schema built by a concurrent caller");
                return Ok(schema);
            }
        }

        let epoch = self.epoch.load(Ordering::SeqCst);

        if !refresh {
            if let Some(schema) = self.load_persisted() {
                let schema = Arc::new(schema);
                self.install(epoch, schema.clone());
                return Ok(schema);
            }
        }

        let schema = Arc::new(Schema::build(transport)?);
        info!(
            service = %self.service,
            functions = schema.functions.len(),
            types = schema.types.len(),
            refresh,
            "Schema built"
        );
        self.persist(&schema);
        self.install(epoch, schema.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(schema)
    }

    /// Drop the snapshot; the next access rebuilds.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.slot.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(store) = &self.store {
            store.remove(&self.key());
        }
        debug!(service = %self.service, "Schema cache invalidated");
    }

    fn install(&self, epoch: u64, schema: Arc<Schema>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *slot = Some(schema);
        } else {
            debug!(service = %self.service, "Schema invalidated during build, not cached");
        }
    }

    fn load_persisted(&self) -> Option<Schema> {
        let bytes = self.store.as_ref()?.get(&self.key())?;
        match Schema::from_bytes(&bytes) {
            Ok(schema) => {
                debug!(service = %self.service, "Schema loaded from cache store");
                Some(schema)
            }
            Err(err) => {
                warn!(service = %self.service, error = %err, "Discarding unreadable cached schema");
                None
            }
        }
    }

    fn persist(&self, schema: &Schema) {
        let Some(store) = &self.store else {
            return;
        };
        match schema.to_bytes() {
            Ok(bytes) => store.put(&self.key(), bytes, self.ttl),
            Err(err) => warn!(service = %self.service, error = %err, "Schema not persisted"),
        }
    }
}
