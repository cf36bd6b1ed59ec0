//! Core Database Backend Traits
//!
//! This module defines the traits the engine uses to talk to a store. The
//! target store (the table being renamed) and the log store (ledger and
//! detail tables) are both reached through [`DatabasePool`], so the batch
//! protocol never depends on a concrete driver.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

/// Abstract database transaction trait
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement within the transaction
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> EngineResult<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> EngineResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> EngineResult<()>;
}

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// SQL dialect spoken by the store behind this pool
    fn dialect(&self) -> SqlDialect;

    /// Begin a transaction from the pool
    async fn begin_transaction(&self) -> EngineResult<Box<dyn DatabaseTransaction>>;

    /// Execute a statement directly on the pool and return the affected row count
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> EngineResult<u64>;

    /// Execute a query and return result rows directly on the pool
    async fn fetch_all(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> EngineResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a query and return the first result row directly on the pool
    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> EngineResult<Option<Box<dyn DatabaseRow>>>;

    /// Close the pool, releasing every connection
    async fn close(&self);

    /// Perform a health check on the pool
    async fn health_check(&self) -> EngineResult<Duration>;
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> EngineResult<DatabaseValue>;
}

/// Typed column access on top of [`DatabaseRow`]
pub trait DatabaseRowExt {
    /// Read a column as text, coercing numbers and booleans
    fn text(&self, column: &str) -> EngineResult<Option<String>>;

    /// Read a non-null text column
    fn required_text(&self, column: &str) -> EngineResult<String>;

    /// Read a non-null integer column
    fn required_i64(&self, column: &str) -> EngineResult<i64>;
}

impl<R: DatabaseRow + ?Sized> DatabaseRowExt for R {
    fn text(&self, column: &str) -> EngineResult<Option<String>> {
        Ok(self.get_by_name(column)?.into_text())
    }

    fn required_text(&self, column: &str) -> EngineResult<String> {
        self.text(column)?
            .ok_or_else(|| EngineError::query(format!("Column '{}' is unexpectedly NULL", column)))
    }

    fn required_i64(&self, column: &str) -> EngineResult<i64> {
        let value = self.get_by_name(column)?;
        value.as_i64().ok_or_else(|| {
            EngineError::query(format!("Column '{}' is not an integer: {:?}", column, value))
        })
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl DatabaseValue {
    /// Coerce to text; row keys are stored in the audit trail this way
    pub fn into_text(self) -> Option<String> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(b) => Some(b.to_string()),
            DatabaseValue::Int64(i) => Some(i.to_string()),
            DatabaseValue::Float64(f) => Some(f.to_string()),
            DatabaseValue::String(s) => Some(s),
        }
    }

    /// Integer view, parsing text when the driver hands back a string
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<&String> for DatabaseValue {
    fn from(value: &String) -> Self {
        DatabaseValue::String(value.clone())
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    /// Predicate comparing a (possibly numeric) key column with a text parameter.
    ///
    /// PostgreSQL does not coerce `integer = text`, so the column is cast.
    pub fn key_equals(&self, quoted_column: &str, placeholder: &str) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("CAST({} AS TEXT) = {}", quoted_column, placeholder),
            SqlDialect::MySQL | SqlDialect::SQLite => {
                format!("{} = {}", quoted_column, placeholder)
            }
        }
    }

    /// Whether `CREATE INDEX IF NOT EXISTS` is understood
    pub fn supports_create_index_if_not_exists(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => true,
            SqlDialect::MySQL => false,
        }
    }
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub test_before_acquire: bool,
}

impl DatabasePoolConfig {
    /// One long-lived connection. Required for `sqlite::memory:`, where
    /// every new connection would see an empty database.
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_seconds: 5,
            idle_timeout_seconds: None,
            max_lifetime_seconds: None,
            test_before_acquire: false,
        }
    }
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 2,
            min_connections: 0,
            acquire_timeout_seconds: 10,
            idle_timeout_seconds: Some(60),
            max_lifetime_seconds: Some(600),
            test_before_acquire: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(2), "$3");
        assert_eq!(SqlDialect::MySQL.parameter_placeholder(4), "?");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(0), "?");
    }

    #[test]
    fn test_key_equals_casts_on_postgres() {
        assert_eq!(
            SqlDialect::PostgreSQL.key_equals("\"id\"", "$1"),
            "CAST(\"id\" AS TEXT) = $1"
        );
        assert_eq!(SqlDialect::MySQL.key_equals("`id`", "?"), "`id` = ?");
    }

    #[test]
    fn test_value_text_coercion() {
        assert_eq!(DatabaseValue::Int64(42).into_text(), Some("42".to_string()));
        assert_eq!(DatabaseValue::Null.into_text(), None);
        assert_eq!(DatabaseValue::from("7").as_i64(), Some(7));
        assert_eq!(DatabaseValue::from(Option::<String>::None), DatabaseValue::Null);
    }
}
