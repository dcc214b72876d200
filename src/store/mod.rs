//! Entity store seam.
//!
//! The pipeline talks to persistence through three traits:
//!
//! - [`StoreConnector`] opens a store (a connection pool) from a connection string
//! - [`EntityStore`] resolves the active schema of a table and hands out writers
//! - [`EntityWriter`] creates entities with idempotent semantics
//!
//! A writer must accept concurrent `create_entity` calls, each of which either
//! creates exactly one entity or reports [`StoreError::AlreadyExists`].
//!
//! Two implementations ship with the crate: [`postgres`] for real runs and
//! [`memory`] for dry runs and tests.

pub mod memory;
pub mod postgres;

use crate::config::MAX_SLUG_BYTES;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

static CANONICAL_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").unwrap());

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("entity already exists")]
    AlreadyExists,

    #[error("no active schema for table {0}")]
    SchemaNotFound(String),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),

    #[error("invalid slug {0:?}")]
    InvalidSlug(String),

    #[error("payload does not match schema: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Active schema of one entity table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaHandle {
    pub schema_id: Uuid,
    pub table_name: String,
    pub definition: Value,
}

/// Parameters of one `create_entity` call.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub entity_id: Uuid,
    pub slug: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: EntityStore;

    async fn connect(&self, url: &str) -> Result<Self::Store, StoreError>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn resolve_active_schema(&self, table_name: &str) -> Result<SchemaHandle, StoreError>;

    fn entity_writer(&self, schema: SchemaHandle) -> Result<Arc<dyn EntityWriter>, StoreError>;

    /// Releases the underlying pool. Called once, on success and failure alike.
    async fn close(&self);
}

#[async_trait]
pub trait EntityWriter: Send + Sync {
    async fn create_entity(&self, entity: NewEntity) -> Result<(), StoreError>;

    /// Final authority on slug form.
    fn normalize_slug(&self, candidate: &str) -> Result<String, StoreError> {
        canonical_slug(candidate)
    }
}

/// The store's slug rule: lower-case, dash-separated `[a-z0-9]` runs, bounded length.
pub fn canonical_slug(candidate: &str) -> Result<String, StoreError> {
    let slug = candidate.trim().to_ascii_lowercase();
    if slug.len() > MAX_SLUG_BYTES || !CANONICAL_SLUG.is_match(&slug) {
        return Err(StoreError::InvalidSlug(candidate.to_string()));
    }
    Ok(slug)
}

pub fn validate_table_name(table_name: &str) -> Result<(), StoreError> {
    if TABLE_NAME.is_match(table_name) {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table_name.to_string()))
    }
}

/// Decodes `raw` and checks it against the structural part of a JSON schema:
/// object shape, `required` members, `additionalProperties: false` and the
/// primitive `type` of declared properties.
pub fn check_payload(schema: &Value, raw: &[u8]) -> Result<Value, StoreError> {
    let payload: Value =
        serde_json::from_slice(raw).map_err(|e| StoreError::Validation(e.to_string()))?;
    let object = payload
        .as_object()
        .ok_or_else(|| StoreError::Validation("payload must be an object".to_string()))?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(StoreError::Validation(format!("missing required field {field}")));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in object {
        match properties.and_then(|p| p.get(name)) {
            Some(property) => {
                if let Some(expected) = property.get("type").and_then(Value::as_str) {
                    if !matches_type(value, expected) {
                        return Err(StoreError::Validation(format!(
                            "field {name} is not of type {expected}"
                        )));
                    }
                }
            }
            None if closed => {
                return Err(StoreError::Validation(format!("unexpected field {name}")));
            }
            None => {}
        }
    }

    Ok(payload)
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
