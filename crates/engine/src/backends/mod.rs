//! Database Backend Abstractions
//!
//! This module provides the store abstraction used by the engine for both
//! the target table and the audit log, plus the sqlx-backed implementation
//! that reaches PostgreSQL, MySQL and SQLite.

pub mod any;
pub mod core;

// Re-export core traits and types
pub use self::any::AnyBackend;
pub use self::core::*;

use serde::Deserialize;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackendType {
    #[serde(alias = "postgresql")]
    Postgres,
    MySQL,
    SQLite,
}

impl DatabaseBackendType {
    /// SQL dialect spoken by this backend
    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::Postgres => SqlDialect::PostgreSQL,
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
            DatabaseBackendType::SQLite => SqlDialect::SQLite,
        }
    }

    /// Default TCP port for network backends
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseBackendType::Postgres => Some(5432),
            DatabaseBackendType::MySQL => Some(3306),
            DatabaseBackendType::SQLite => None,
        }
    }

    /// URL scheme understood by sqlx
    pub fn scheme(&self) -> &'static str {
        match self {
            DatabaseBackendType::Postgres => "postgres",
            DatabaseBackendType::MySQL => "mysql",
            DatabaseBackendType::SQLite => "sqlite",
        }
    }

    /// Detect database backend type from URL
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Some(DatabaseBackendType::Postgres)
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Some(DatabaseBackendType::MySQL)
        } else if url.starts_with("sqlite:") {
            Some(DatabaseBackendType::SQLite)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::Postgres => write!(f, "postgres"),
            DatabaseBackendType::MySQL => write!(f, "mysql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::Postgres),
            "mysql" => Ok(DatabaseBackendType::MySQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}
