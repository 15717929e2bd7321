use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgRow, PgValueRef};
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};

use crate::error::EngineError;

/// Port: runs a validated SQL statement against one configured database
/// and returns rows as JSON plus a row count.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<(Vec<Map<String, Value>>, usize), EngineError>;
}

/// Default `sqlx::PgPool`-backed implementation, adapted from the teacher's
/// `db::query::execute_postgres_query`, trimmed to Postgres-only and
/// enforced read-only at the transaction level (spec.md §6).
pub struct PgSqlExecutor {
    pool: PgPool,
}

impl PgSqlExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgSqlExecutor { pool }
    }
}

#[async_trait]
impl SqlExecutor for PgSqlExecutor {
    async fn execute(&self, sql: &str) -> Result<(Vec<Map<String, Value>>, usize), EngineError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        tx.rollback().await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(row_to_json(row)?);
        }
        let count = out.len();
        Ok((out, count))
    }
}

fn row_to_json(row: &PgRow) -> Result<Map<String, Value>, EngineError> {
    let mut obj = Map::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let raw: PgValueRef = row
            .try_get_raw(idx)
            .map_err(|e| EngineError::DbError(e.to_string()))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            value_for_type(row, idx, column.type_info().name())
        };
        obj.insert(column.name().to_string(), value);
    }
    Ok(obj)
}

fn value_for_type(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" => row
            .try_get::<i16, _>(idx)
            .map(|v| Value::from(v))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<i32, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<f64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<bool, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Value, _>(idx)
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" | "TIMESTAMPTZ" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}
