//! In-process entity store with the same contract as the Postgres store.
//!
//! Used for `--dry-run` and by the test suites. Entity id and slug are both
//! unique per table; a clash on either reports [`StoreError::AlreadyExists`].

use super::{
    check_payload, validate_table_name, EntityStore, EntityWriter, NewEntity, SchemaHandle,
    StoreConnector, StoreError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub entity_id: Uuid,
    pub schema_id: Uuid,
    pub slug: String,
    pub payload: Value,
}

#[derive(Default)]
struct Table {
    by_id: HashMap<Uuid, StoredEntity>,
    slugs: HashMap<String, Uuid>,
}

#[derive(Default)]
struct Inner {
    schemas: DashMap<String, SchemaHandle>,
    tables: DashMap<String, Table>,
    failing_slugs: DashMap<String, String>,
    closed: AtomicBool,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` as the active schema of `table_name`.
    pub fn register_schema(&self, table_name: &str, definition: Value) -> SchemaHandle {
        let handle = SchemaHandle {
            schema_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, table_name.as_bytes()),
            table_name: table_name.to_string(),
            definition,
        };
        self.inner
            .schemas
            .insert(table_name.to_string(), handle.clone());
        handle
    }

    /// Registers a schema that accepts any JSON object.
    pub fn with_open_schema(self, table_name: &str) -> Self {
        self.register_schema(table_name, json!({"type": "object"}));
        self
    }

    /// Makes inserts for `slug` fail with [`StoreError::Unavailable`].
    pub fn fail_on_slug(&self, slug: &str, message: &str) {
        self.inner
            .failing_slugs
            .insert(slug.to_string(), message.to_string());
    }

    pub fn len(&self, table_name: &str) -> usize {
        self.inner
            .tables
            .get(table_name)
            .map(|t| t.by_id.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table_name: &str) -> bool {
        self.len(table_name) == 0
    }

    pub fn get(&self, table_name: &str, entity_id: &Uuid) -> Option<StoredEntity> {
        self.inner
            .tables
            .get(table_name)
            .and_then(|t| t.by_id.get(entity_id).cloned())
    }

    pub fn get_by_slug(&self, table_name: &str, slug: &str) -> Option<StoredEntity> {
        let table = self.inner.tables.get(table_name)?;
        let id = table.slugs.get(slug)?;
        table.by_id.get(id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    type Store = MemoryStore;

    async fn connect(&self, _url: &str) -> Result<MemoryStore, StoreError> {
        self.inner.closed.store(false, Ordering::Relaxed);
        Ok(self.clone())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn resolve_active_schema(&self, table_name: &str) -> Result<SchemaHandle, StoreError> {
        validate_table_name(table_name)?;
        self.inner
            .schemas
            .get(table_name)
            .map(|s| s.value().clone())
            .ok_or_else(|| StoreError::SchemaNotFound(table_name.to_string()))
    }

    fn entity_writer(&self, schema: SchemaHandle) -> Result<Arc<dyn EntityWriter>, StoreError> {
        Ok(Arc::new(MemoryWriter {
            store: self.clone(),
            schema,
        }))
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
    }
}

struct MemoryWriter {
    store: MemoryStore,
    schema: SchemaHandle,
}

#[async_trait]
impl EntityWriter for MemoryWriter {
    async fn create_entity(&self, entity: NewEntity) -> Result<(), StoreError> {
        let inner = &self.store.inner;
        if inner.closed.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        if let Some(message) = inner.failing_slugs.get(&entity.slug) {
            return Err(StoreError::Unavailable(message.clone()));
        }

        let payload = check_payload(&self.schema.definition, &entity.payload)?;

        // The entry guard locks the table's shard, making check-and-insert atomic.
        let mut table = inner
            .tables
            .entry(self.schema.table_name.clone())
            .or_default();
        if table.by_id.contains_key(&entity.entity_id) || table.slugs.contains_key(&entity.slug) {
            return Err(StoreError::AlreadyExists);
        }
        table.slugs.insert(entity.slug.clone(), entity.entity_id);
        table.by_id.insert(
            entity.entity_id,
            StoredEntity {
                entity_id: entity.entity_id,
                schema_id: self.schema.schema_id,
                slug: entity.slug,
                payload,
            },
        );
        Ok(())
    }
}
