//! Error types for the rename engine
//!
//! Covers configuration problems, unreachable stores, failed statements
//! and refused rollbacks. Malformed bulk input is not an error: those rows
//! are reported as [`crate::orchestrator::RowWarning`]s.

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unknown environment '{name}'. Configured: {available}")]
    UnknownEnvironment { name: String, available: String },

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Error types for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected before any store was touched
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Caller-supplied input rejected before any store was touched
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A store could not be reached
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        hint: Option<String>,
    },

    /// A statement failed against the target or log store
    #[error("Query error: {message}")]
    Query { message: String },

    /// No ledger row exists for the batch
    #[error("Batch '{batch_id}' not found in the ledger")]
    BatchNotFound { batch_id: String },

    /// The batch does not pass the rollback gate
    #[error("Rollback of batch '{batch_id}' refused: {reason}")]
    RollbackRefused { batch_id: String, reason: String },
}

impl EngineError {
    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a connection error, attaching a remediation hint when the
    /// failure matches a known "cannot connect" condition
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = connection_hint(&message).map(str::to_string);
        Self::Connection { message, hint }
    }

    /// Remediation hint for connection failures
    pub fn hint(&self) -> Option<&str> {
        match self {
            EngineError::Connection { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// Whether the error means a store could not be reached at all
    pub fn is_connection(&self) -> bool {
        matches!(self, EngineError::Connection { .. })
    }
}

const CONNECTION_HINTS: &[(&[&str], &str)] = &[
    (
        &["connection refused", "can't connect", "could not connect"],
        "check that the database server is running and that host and port are correct",
    ),
    (
        &["timed out", "timeout"],
        "the server did not answer in time; check network access and firewall rules",
    ),
    (
        &["access denied", "password authentication failed", "authentication"],
        "check the configured user and password",
    ),
    (
        &["unknown database", "does not exist"],
        "check the configured database name",
    ),
    (
        &["unable to open database file"],
        "check that the SQLite file path exists and is writable",
    ),
    (
        &["failed to lookup address", "name or service not known", "no such host"],
        "the host name could not be resolved",
    ),
];

/// Match an error message against known "cannot connect" conditions
pub fn connection_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    CONNECTION_HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(_, hint)| *hint)
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => EngineError::connection(err.to_string()),
            other => EngineError::query(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_hint_refused() {
        let err = EngineError::connection(
            "error communicating with database: Connection refused (os error 111)",
        );
        assert!(err.is_connection());
        assert!(err.hint().unwrap().contains("server is running"));
    }

    #[test]
    fn test_connection_hint_credentials() {
        let hint = connection_hint("Access denied for user 'ops'@'10.0.0.4' (using password: YES)");
        assert_eq!(hint, Some("check the configured user and password"));
    }

    #[test]
    fn test_connection_hint_unknown_condition() {
        let err = EngineError::connection("something unexpected");
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_pool_closed_is_connection_error() {
        let err: EngineError = sqlx::Error::PoolClosed.into();
        assert!(err.is_connection());

        let err: EngineError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, EngineError::Query { .. }));
    }
}
