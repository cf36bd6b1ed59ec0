//! Detail Recorder - the reversible delta of every affected row
//!
//! Detail rows are written before the target table is touched and are the
//! only input a rollback reads. They are never updated or deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backends::{DatabasePool, DatabaseRow, DatabaseRowExt, DatabaseValue, SqlDialect};
use crate::error::EngineResult;
use crate::ledger::{format_timestamp, parse_timestamp};
use crate::security::{quote_identifier, sanitize_identifier};

/// Rows per INSERT statement; six parameters each keeps well under
/// SQLite's historical 999-parameter limit
const INSERT_CHUNK_ROWS: usize = 150;

/// Parameters bound per detail row
const PARAMS_PER_ROW: usize = 6;

/// One row to persist for a batch
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    /// Position within the batch, starting at 1
    pub seq: u64,
    pub row_key: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub updated_at: DateTime<Utc>,
}

/// One persisted detail row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRecord {
    pub batch_id: String,
    pub seq: u64,
    pub row_id: String,
    pub old_name: Option<String>,
    pub new_name: String,
    pub updated_at: DateTime<Utc>,
}

impl DetailRecord {
    fn from_row(row: &dyn DatabaseRow) -> EngineResult<Self> {
        Ok(Self {
            batch_id: row.required_text("batch_id")?,
            seq: row.required_i64("seq")?.max(0) as u64,
            row_id: row.required_text("row_id")?,
            old_name: row.text("old_name")?,
            new_name: row.required_text("new_name")?,
            updated_at: parse_timestamp(&row.required_text("updated_at")?)?,
        })
    }
}

/// Detail table access
#[derive(Clone)]
pub struct DetailRecorder {
    pool: Arc<dyn DatabasePool>,
    table: String,
}

impl DetailRecorder {
    pub fn new(pool: Arc<dyn DatabasePool>, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    fn dialect(&self) -> SqlDialect {
        self.pool.dialect()
    }

    fn quoted_table(&self) -> String {
        quote_identifier(self.dialect(), &self.table)
    }

    /// Create the detail table and its `(batch_id, seq)` index when missing
    pub async fn ensure_schema(&self) -> EngineResult<()> {
        let dialect = self.dialect();
        let index_name = quote_identifier(
            dialect,
            &format!("idx_{}_batch_id", sanitize_identifier(&self.table)),
        );
        let columns = "batch_id VARCHAR(64) NOT NULL, \
             seq BIGINT NOT NULL, \
             row_id VARCHAR(255) NOT NULL, \
             old_name TEXT, \
             new_name TEXT NOT NULL, \
             updated_at VARCHAR(32) NOT NULL";

        if dialect.supports_create_index_if_not_exists() {
            let create = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.quoted_table(),
                columns
            );
            self.pool.execute(&create, &[]).await?;

            let index = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (batch_id, seq)",
                index_name,
                self.quoted_table()
            );
            self.pool.execute(&index, &[]).await?;
        } else {
            let create = format!(
                "CREATE TABLE IF NOT EXISTS {} ({}, INDEX {} (batch_id, seq))",
                self.quoted_table(),
                columns,
                index_name
            );
            self.pool.execute(&create, &[]).await?;
        }

        tracing::debug!(table = %self.table, "Detail table ensured");
        Ok(())
    }

    /// Persist the rows of one unit of work in a single log-store transaction.
    ///
    /// Returns once the transaction is committed. An empty slice is a no-op.
    pub async fn record(&self, batch_id: &str, rows: &[DetailRow]) -> EngineResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin_transaction().await?;
        let mut written = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let (sql, params) = self.insert_statement(batch_id, chunk);
            match tx.execute(&sql, &params).await {
                Ok(affected) => written += affected,
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(
                            batch_id = %batch_id,
                            error = %rollback_err,
                            "Detail transaction rollback failed"
                        );
                    }
                    return Err(err);
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(batch_id = %batch_id, rows = written, "Detail rows recorded");
        Ok(written)
    }

    fn insert_statement(&self, batch_id: &str, rows: &[DetailRow]) -> (String, Vec<DatabaseValue>) {
        let dialect = self.dialect();
        let mut params = Vec::with_capacity(rows.len() * PARAMS_PER_ROW);
        let mut tuples = Vec::with_capacity(rows.len());

        for row in rows {
            let base = params.len();
            let slots: Vec<String> = (base..base + PARAMS_PER_ROW)
                .map(|i| dialect.parameter_placeholder(i))
                .collect();
            tuples.push(format!("({})", slots.join(", ")));

            params.push(DatabaseValue::from(batch_id));
            params.push(DatabaseValue::Int64(row.seq as i64));
            params.push(DatabaseValue::from(&row.row_key));
            params.push(DatabaseValue::from(row.old_value.clone()));
            params.push(DatabaseValue::from(&row.new_value));
            params.push(DatabaseValue::from(format_timestamp(row.updated_at)));
        }

        let sql = format!(
            "INSERT INTO {} (batch_id, seq, row_id, old_name, new_name, updated_at) VALUES {}",
            self.quoted_table(),
            tuples.join(", ")
        );
        (sql, params)
    }

    /// All detail rows of a batch in recording order
    pub async fn for_batch(&self, batch_id: &str) -> EngineResult<Vec<DetailRecord>> {
        let sql = format!(
            "SELECT batch_id, seq, row_id, old_name, new_name, updated_at FROM {} \
             WHERE batch_id = {} ORDER BY seq",
            self.quoted_table(),
            self.dialect().parameter_placeholder(0)
        );

        self.pool
            .fetch_all(&sql, &[DatabaseValue::from(batch_id)])
            .await?
            .iter()
            .map(|row| DetailRecord::from_row(row.as_ref()))
            .collect()
    }

    /// Number of detail rows persisted for a batch
    pub async fn count_for_batch(&self, batch_id: &str) -> EngineResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS row_count FROM {} WHERE batch_id = {}",
            self.quoted_table(),
            self.dialect().parameter_placeholder(0)
        );

        match self.pool.fetch_optional(&sql, &[DatabaseValue::from(batch_id)]).await? {
            Some(row) => Ok(row.required_i64("row_count")?.max(0) as u64),
            None => Ok(0),
        }
    }
}
