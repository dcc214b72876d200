//! PostgreSQL entity store.
//!
//! Expected layout:
//!
//! ```sql
//! CREATE TABLE schema_repository (
//!     schema_id         UUID PRIMARY KEY,
//!     table_name        TEXT NOT NULL,
//!     schema_definition JSONB NOT NULL,
//!     is_active         BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE mtg_cards (
//!     entity_id  UUID PRIMARY KEY,
//!     schema_id  UUID NOT NULL REFERENCES schema_repository (schema_id),
//!     slug       TEXT NOT NULL UNIQUE,
//!     payload    JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use super::{
    check_payload, validate_table_name, EntityStore, EntityWriter, NewEntity, SchemaHandle,
    StoreConnector, StoreError,
};
use crate::config::{DEFAULT_MAX_CONNECTIONS, POOL_ACQUIRE_TIMEOUT_SECS, SCHEMA_REPOSITORY_TABLE};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgConnector {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgConnector {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PgConnector {
    pub fn new(max_connections: u32) -> Self {
        Self {
            max_connections: max_connections.max(1),
            ..Self::default()
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgEntityStore;

    async fn connect(&self, url: &str) -> Result<PgEntityStore, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(url)
            .await?;
        info!(
            max_connections = self.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(PgEntityStore { pool })
    }
}

pub struct PgEntityStore {
    pool: PgPool,
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn resolve_active_schema(&self, table_name: &str) -> Result<SchemaHandle, StoreError> {
        validate_table_name(table_name)?;

        let sql = format!(
            "SELECT schema_id, table_name, schema_definition FROM {SCHEMA_REPOSITORY_TABLE} \
             WHERE table_name = $1 AND is_active ORDER BY created_at DESC LIMIT 1"
        );
        let row: Option<(Uuid, String, Json<Value>)> = sqlx::query_as(&sql)
            .bind(table_name)
            .fetch_optional(&self.pool)
            .await?;

        let (schema_id, table_name, Json(definition)) =
            row.ok_or_else(|| StoreError::SchemaNotFound(table_name.to_string()))?;
        debug!(%schema_id, table = %table_name, "Resolved active schema");

        Ok(SchemaHandle {
            schema_id,
            table_name,
            definition,
        })
    }

    fn entity_writer(&self, schema: SchemaHandle) -> Result<Arc<dyn EntityWriter>, StoreError> {
        validate_table_name(&schema.table_name)?;
        let insert_sql = insert_statement(&schema.table_name);
        Ok(Arc::new(PgEntityWriter {
            pool: self.pool.clone(),
            schema,
            insert_sql,
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn insert_statement(table_name: &str) -> String {
    format!(
        "INSERT INTO \"{table_name}\" (entity_id, schema_id, slug, payload) \
         VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING"
    )
}

pub struct PgEntityWriter {
    pool: PgPool,
    schema: SchemaHandle,
    insert_sql: String,
}

#[async_trait]
impl EntityWriter for PgEntityWriter {
    async fn create_entity(&self, entity: NewEntity) -> Result<(), StoreError> {
        let payload = check_payload(&self.schema.definition, &entity.payload)?;

        let result = sqlx::query(&self.insert_sql)
            .bind(entity.entity_id)
            .bind(self.schema.schema_id)
            .bind(&entity.slug)
            .bind(Json(payload))
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StoreError::AlreadyExists),
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}
