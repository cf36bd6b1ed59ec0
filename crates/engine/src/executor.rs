//! Mutation Executor - select-then-update against the target table
//!
//! The affected rows are read before the UPDATE runs because the UPDATE
//! itself does not return row contents; that snapshot is the reversible
//! delta handed to the audit trail. Both statements share one predicate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::backends::{DatabasePool, DatabaseRowExt, DatabaseValue, SqlDialect};
use crate::error::{EngineError, EngineResult};
use crate::security::quote_identifier;

/// How target rows are selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPredicate {
    /// Match the row whose key column equals this value
    ByKey(String),
    /// Match every row whose value column currently equals this value
    ByValue(String),
}

impl MatchPredicate {
    /// Resolve optional inputs; the row key wins when both are present.
    ///
    /// Whitespace-only input counts as absent. Anything else is matched verbatim.
    pub fn resolve(row_key: Option<&str>, old_value: Option<&str>) -> Option<Self> {
        let present = |s: Option<&str>| s.filter(|s| !s.trim().is_empty()).map(str::to_string);

        present(row_key)
            .map(MatchPredicate::ByKey)
            .or_else(|| present(old_value).map(MatchPredicate::ByValue))
    }

    fn value(&self) -> &str {
        match self {
            MatchPredicate::ByKey(key) => key,
            MatchPredicate::ByValue(value) => value,
        }
    }
}

impl std::fmt::Display for MatchPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPredicate::ByKey(key) => write!(f, "key = {:?}", key),
            MatchPredicate::ByValue(value) => write!(f, "value = {:?}", value),
        }
    }
}

/// A target row as it was right before the update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffectedRow {
    pub row_key: String,
    pub current_value: Option<String>,
}

/// Result of one select-then-update
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub matched_count: u64,
    pub snapshot: Vec<AffectedRow>,
}

/// Receives the snapshot between the SELECT and the UPDATE.
///
/// An error aborts the mutation before the target table is touched.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn persist(&self, snapshot: &[AffectedRow], new_value: &str) -> EngineResult<()>;
}

/// Sink that keeps nothing, for callers that do not audit
pub struct DiscardSnapshot;

#[async_trait]
impl SnapshotSink for DiscardSnapshot {
    async fn persist(&self, _snapshot: &[AffectedRow], _new_value: &str) -> EngineResult<()> {
        Ok(())
    }
}

/// Statements for one predicate, rendered for a dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationStatements {
    pub select: String,
    pub update: String,
}

/// Target table access
#[derive(Clone)]
pub struct MutationExecutor {
    pool: Arc<dyn DatabasePool>,
    table: String,
    value_column: String,
    key_column: String,
}

impl MutationExecutor {
    pub fn new(
        pool: Arc<dyn DatabasePool>,
        table: impl Into<String>,
        value_column: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            table: table.into(),
            value_column: value_column.into(),
            key_column: key_column.into(),
        }
    }

    fn dialect(&self) -> SqlDialect {
        self.pool.dialect()
    }

    /// WHERE clause for a predicate, with its first placeholder at `first_param`
    fn where_clause(&self, predicate: &MatchPredicate, first_param: usize) -> String {
        let dialect = self.dialect();
        let placeholder = dialect.parameter_placeholder(first_param);
        match predicate {
            MatchPredicate::ByKey(_) => {
                dialect.key_equals(&quote_identifier(dialect, &self.key_column), &placeholder)
            }
            MatchPredicate::ByValue(_) => {
                format!("{} = {}", quote_identifier(dialect, &self.value_column), placeholder)
            }
        }
    }

    /// Render the SELECT and UPDATE for a predicate
    pub fn statements(&self, predicate: &MatchPredicate) -> MutationStatements {
        let dialect = self.dialect();
        let table = quote_identifier(dialect, &self.table);
        let key = quote_identifier(dialect, &self.key_column);
        let value = quote_identifier(dialect, &self.value_column);

        MutationStatements {
            select: format!(
                "SELECT {} AS row_key, {} AS current_value FROM {} WHERE {}",
                key,
                value,
                table,
                self.where_clause(predicate, 0)
            ),
            update: format!(
                "UPDATE {} SET {} = {} WHERE {}",
                table,
                value,
                dialect.parameter_placeholder(0),
                self.where_clause(predicate, 1)
            ),
        }
    }

    /// Read the rows a predicate matches, without changing anything
    pub async fn snapshot(&self, predicate: &MatchPredicate) -> EngineResult<Vec<AffectedRow>> {
        let statements = self.statements(predicate);
        let rows = self
            .pool
            .fetch_all(&statements.select, &[DatabaseValue::from(predicate.value())])
            .await?;

        rows.iter()
            .map(|row| {
                Ok(AffectedRow {
                    row_key: row.text("row_key")?.ok_or_else(|| {
                        EngineError::query(format!(
                            "Target row with NULL key column '{}'",
                            self.key_column
                        ))
                    })?,
                    current_value: row.text("current_value")?,
                })
            })
            .collect()
    }

    /// Snapshot, hand the snapshot to `sink`, then update with the same predicate
    pub async fn select_then_update(
        &self,
        predicate: &MatchPredicate,
        new_value: &str,
        sink: &dyn SnapshotSink,
    ) -> EngineResult<MutationOutcome> {
        let snapshot = self.snapshot(predicate).await?;
        let matched_count = snapshot.len() as u64;

        sink.persist(&snapshot, new_value).await?;

        if snapshot.is_empty() {
            tracing::debug!(predicate = %predicate, "No target rows matched");
            return Ok(MutationOutcome { matched_count, snapshot });
        }

        let statements = self.statements(predicate);
        let params = [DatabaseValue::from(new_value), DatabaseValue::from(predicate.value())];
        let affected = self.pool.execute(&statements.update, &params).await?;

        if affected != matched_count {
            tracing::warn!(
                predicate = %predicate,
                matched = matched_count,
                affected,
                "Target rows changed between snapshot and update"
            );
        }

        Ok(MutationOutcome { matched_count, snapshot })
    }

    /// Put `old_value` back on the row with `row_key`, but only while it still
    /// holds `expected_current`. Returns whether a row was restored.
    pub async fn restore(
        &self,
        row_key: &str,
        old_value: Option<&str>,
        expected_current: &str,
    ) -> EngineResult<bool> {
        let dialect = self.dialect();
        let value = quote_identifier(dialect, &self.value_column);
        let key = quote_identifier(dialect, &self.key_column);
        let sql = format!(
            "UPDATE {} SET {} = {} WHERE {} AND {} = {}",
            quote_identifier(dialect, &self.table),
            value,
            dialect.parameter_placeholder(0),
            dialect.key_equals(&key, &dialect.parameter_placeholder(1)),
            value,
            dialect.parameter_placeholder(2)
        );
        let params = [
            DatabaseValue::from(old_value),
            DatabaseValue::from(row_key),
            DatabaseValue::from(expected_current),
        ];

        Ok(self.pool.execute(&sql, &params).await? > 0)
    }
}
