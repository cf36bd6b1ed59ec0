//! Resolved per-environment configuration
//!
//! These are the validated shapes the engine consumes. Loading them from a
//! file, and rejecting absent fields, is the caller's job; [`EnvironmentConfig::validate`]
//! then checks identifiers against the allow-list and connection details
//! against the chosen backend before any store is touched.

use url::Url;

use crate::backends::DatabaseBackendType;
use crate::error::ConfigError;
use crate::security::validate_identifier;

/// Connection settings for one store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub backend: DatabaseBackendType,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name, or file path for SQLite (`:memory:` for an in-memory store)
    pub database: Option<String>,
    /// Complete connection URL; wins over the individual fields
    pub url: Option<String>,
}

impl StoreConfig {
    /// Store settings for a SQLite file or `:memory:`
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: DatabaseBackendType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: Some(path.into()),
            url: None,
        }
    }

    /// Validate that every field the backend needs is present
    pub fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            return match DatabaseBackendType::from_url(url) {
                Some(backend) if backend == self.backend => Ok(()),
                Some(backend) => Err(ConfigError::invalid_value(
                    format!("{}.url", prefix),
                    backend.to_string(),
                    format!("a {} URL to match backend", self.backend),
                )),
                None => Err(ConfigError::invalid_value(
                    format!("{}.url", prefix),
                    "<redacted>",
                    "a postgres://, mysql:// or sqlite: URL",
                )),
            };
        }

        let database = self.database.as_deref().unwrap_or("").trim();
        if database.is_empty() {
            return Err(ConfigError::missing_required(
                format!("{}.database", prefix),
                "Set the database name (or file path for sqlite)",
            ));
        }

        if self.backend != DatabaseBackendType::SQLite {
            if self.host.as_deref().unwrap_or("").trim().is_empty() {
                return Err(ConfigError::missing_required(
                    format!("{}.host", prefix),
                    format!("A {} store needs a host", self.backend),
                ));
            }
            if self.user.as_deref().unwrap_or("").trim().is_empty() {
                return Err(ConfigError::missing_required(
                    format!("{}.user", prefix),
                    format!("A {} store needs a user", self.backend),
                ));
            }
            if self.port == Some(0) {
                return Err(ConfigError::invalid_value(
                    format!("{}.port", prefix),
                    "0",
                    "port between 1 and 65535",
                ));
            }
        }

        Ok(())
    }

    /// Assemble the sqlx connection URL, percent-encoding credentials
    pub fn database_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let database = self.database.clone().unwrap_or_default();

        if self.backend == DatabaseBackendType::SQLite {
            return Ok(if database == ":memory:" {
                "sqlite::memory:".to_string()
            } else {
                format!("sqlite://{}?mode=rwc", database)
            });
        }

        let host = self.host.clone().unwrap_or_default();
        let base = format!("{}://{}", self.backend.scheme(), host);
        let mut url = Url::parse(&base).map_err(|e| {
            ConfigError::invalid_value("host", host.clone(), format!("a valid host name ({})", e))
        })?;

        let port = self.port.or(self.backend.default_port());
        let user = self.user.clone().unwrap_or_default();
        if url.set_port(port).is_err()
            || url.set_username(&user).is_err()
            || url.set_password(self.password.as_deref()).is_err()
        {
            return Err(ConfigError::invalid_value(
                "host",
                host,
                "a host that accepts port and credentials",
            ));
        }
        url.set_path(&database);

        Ok(url.to_string())
    }
}

/// The table being renamed
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub store: StoreConfig,
    pub table: String,
    pub value_column: String,
    pub key_column: String,
}

/// Where the audit trail lives
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub store: StoreConfig,
    pub ledger_table: String,
    pub detail_table: String,
}

/// Everything the engine needs for one environment
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentConfig {
    pub name: String,
    pub target: TargetConfig,
    pub log: LogConfig,
}

impl EnvironmentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing_required(
                "environment name",
                "Every environment needs a name",
            ));
        }

        let prefix = format!("environments.{}", self.name);

        self.target.store.validate(&format!("{}.target", prefix))?;
        validate_identifier(&format!("{}.target.table", prefix), &self.target.table)?;
        validate_identifier(&format!("{}.target.value_column", prefix), &self.target.value_column)?;
        validate_identifier(&format!("{}.target.key_column", prefix), &self.target.key_column)?;

        self.log.store.validate(&format!("{}.log", prefix))?;
        validate_identifier(&format!("{}.log.ledger_table", prefix), &self.log.ledger_table)?;
        validate_identifier(&format!("{}.log.detail_table", prefix), &self.log.detail_table)?;

        if self.target.value_column == self.target.key_column {
            return Err(ConfigError::invalid_value(
                format!("{}.target.key_column", prefix),
                self.target.key_column.clone(),
                "a column different from value_column",
            ));
        }

        if self.log.ledger_table == self.log.detail_table {
            return Err(ConfigError::invalid_value(
                format!("{}.log.detail_table", prefix),
                self.log.detail_table.clone(),
                "a table different from ledger_table",
            ));
        }

        Ok(())
    }
}
