//! sqlx `Any` Backend Implementation
//!
//! One backend serves PostgreSQL, MySQL and SQLite through sqlx's `Any`
//! driver. The driver is picked from the URL scheme; the SQL dialect is
//! carried next to the pool so statements can be rendered for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Pool, Row, TypeInfo, ValueRef};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{EngineError, EngineResult};

/// Pool factory for every store reachable through sqlx's `Any` driver
#[derive(Debug, Default)]
pub struct AnyBackend;

impl AnyBackend {
    /// Create a new backend instance
    pub fn new() -> Self {
        Self
    }

    /// Create a connection pool from a database URL
    pub async fn create_pool(
        &self,
        database_url: &str,
        config: &DatabasePoolConfig,
    ) -> EngineResult<Arc<dyn DatabasePool>> {
        let backend = DatabaseBackendType::from_url(database_url).ok_or_else(|| {
            EngineError::connection(format!(
                "Unable to detect database backend from URL: {}",
                redact_url(database_url)
            ))
        })?;

        sqlx::any::install_default_drivers();

        let options = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .test_before_acquire(config.test_before_acquire)
            .idle_timeout(config.idle_timeout_seconds.map(Duration::from_secs))
            .max_lifetime(config.max_lifetime_seconds.map(Duration::from_secs));

        let sqlx_pool = options.connect(database_url).await.map_err(|e| {
            EngineError::connection(format!(
                "Failed to connect to {} ({}): {}",
                backend,
                redact_url(database_url),
                e
            ))
        })?;

        tracing::debug!(
            backend = %backend,
            url = %redact_url(database_url),
            "Connection pool created"
        );

        Ok(Arc::new(AnyDatabasePool::new(sqlx_pool, backend.dialect())))
    }
}

/// Mask the password of a database URL for display
pub fn redact_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(_) => database_url.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}

/// Connection pool over sqlx's `Any` driver
pub struct AnyDatabasePool {
    pool: Pool<Any>,
    dialect: SqlDialect,
}

impl AnyDatabasePool {
    pub fn new(pool: Pool<Any>, dialect: SqlDialect) -> Self {
        Self { pool, dialect }
    }
}

#[async_trait]
impl DatabasePool for AnyDatabasePool {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    async fn begin_transaction(&self) -> EngineResult<Box<dyn DatabaseTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(AnyDatabaseTransaction::new(tx)))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> EngineResult<u64> {
        let result = bind_params(sql, params)
            .execute(&self.pool)
            .await
            .map_err(|e| statement_error("execution", e))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> EngineResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = bind_params(sql, params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| statement_error("fetch", e))?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(AnyDatabaseRow::new(row)) as Box<dyn DatabaseRow>)
            .collect())
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> EngineResult<Option<Box<dyn DatabaseRow>>> {
        let row = bind_params(sql, params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| statement_error("fetch", e))?;

        Ok(row.map(|r| Box::new(AnyDatabaseRow::new(r)) as Box<dyn DatabaseRow>))
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn health_check(&self) -> EngineResult<Duration> {
        let start = Instant::now();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::connection(format!("Health check failed: {}", e)))?;

        Ok(start.elapsed())
    }
}

/// Transaction over sqlx's `Any` driver
pub struct AnyDatabaseTransaction {
    tx: Option<sqlx::Transaction<'static, Any>>,
}

impl AnyDatabaseTransaction {
    pub fn new(tx: sqlx::Transaction<'static, Any>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl DatabaseTransaction for AnyDatabaseTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> EngineResult<u64> {
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| EngineError::query("Transaction already completed"))?;

        let result = bind_params(sql, params)
            .execute(&mut **tx)
            .await
            .map_err(|e| statement_error("execution", e))?;

        Ok(result.rows_affected())
    }

    async fn commit(mut self: Box<Self>) -> EngineResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| EngineError::query("Transaction already completed"))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::query(format!("Transaction commit failed: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> EngineResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| EngineError::query("Transaction already completed"))?;

        tx.rollback()
            .await
            .map_err(|e| EngineError::query(format!("Transaction rollback failed: {}", e)))
    }
}

/// Row returned by sqlx's `Any` driver
pub struct AnyDatabaseRow {
    row: AnyRow,
}

impl AnyDatabaseRow {
    pub fn new(row: AnyRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for AnyDatabaseRow {
    fn get_by_name(&self, name: &str) -> EngineResult<DatabaseValue> {
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::query(format!("Column '{}' not found", name)))?;

        any_value_to_database_value(&self.row, index)
    }
}

fn statement_error(stage: &str, err: sqlx::Error) -> EngineError {
    match EngineError::from(err) {
        EngineError::Query { message } => {
            EngineError::query(format!("Query {} failed: {}", stage, message))
        }
        other => other,
    }
}

fn bind_params<'q>(sql: &'q str, params: &[DatabaseValue]) -> Query<'q, Any, AnyArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| bind_database_value(query, param))
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &DatabaseValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
    }
}

/// Convert an `Any` column value to DatabaseValue.
///
/// The value's own type decides the decoding: SQLite reports a declared
/// column type that may not match the cell (`COUNT(*)` is declared `NULL`),
/// and `AnyValueRef::is_null` never reports NULL, so NULL is read from the
/// value's type info instead.
fn any_value_to_database_value(row: &AnyRow, index: usize) -> EngineResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| EngineError::query(format!("Failed to read column {}: {}", index, e)))?;
    let type_info = raw.type_info();
    if type_info.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = type_info.name().to_string();
    let decode_error = |e: sqlx::Error| {
        EngineError::query(format!("Failed to decode {} column {}: {}", type_name, index, e))
    };

    match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(DatabaseValue::Bool).map_err(decode_error),
        "SMALLINT" => row
            .try_get::<i16, _>(index)
            .map(|v| DatabaseValue::Int64(v.into()))
            .map_err(decode_error),
        "INTEGER" => row
            .try_get::<i32, _>(index)
            .map(|v| DatabaseValue::Int64(v.into()))
            .map_err(decode_error),
        "BIGINT" => row.try_get::<i64, _>(index).map(DatabaseValue::Int64).map_err(decode_error),
        "REAL" => row
            .try_get::<f32, _>(index)
            .map(|v| DatabaseValue::Float64(v.into()))
            .map_err(decode_error),
        "DOUBLE" => row.try_get::<f64, _>(index).map(DatabaseValue::Float64).map_err(decode_error),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| DatabaseValue::String(String::from_utf8_lossy(&bytes).into_owned()))
            .map_err(decode_error),
        _ => row.try_get::<String, _>(index).map(DatabaseValue::String).map_err(decode_error),
    }
}
