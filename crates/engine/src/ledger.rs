//! Batch Ledger - one row per operator action
//!
//! A batch row is inserted pessimistically as `failed` with zero rows and
//! only flipped to `done` once every affected row has been recorded and
//! updated. A crash between open and close therefore never leaves a `done`
//! entry without its detail rows.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::backends::{DatabasePool, DatabaseRow, DatabaseRowExt, DatabaseValue, SqlDialect};
use crate::error::{EngineError, EngineResult};
use crate::security::quote_identifier;

/// Fixed-width, lexically sortable UTC timestamp format used in the log store
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a timestamp for the log store
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(text: &str) -> EngineResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            EngineError::query(format!("Malformed timestamp '{}' in log store: {}", text, e))
        })
}

/// Allocate a batch id: creation time to the millisecond plus a random suffix
pub fn generate_batch_id(at: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{}-{:06x}", at.format("%Y%m%d%H%M%S%3f"), suffix)
}

/// How the batch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Single,
    Batch,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::Single => "single",
            BatchMode::Batch => "batch",
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(BatchMode::Single),
            "batch" => Ok(BatchMode::Batch),
            other => Err(EngineError::query(format!("Unknown batch mode '{}' in ledger", other))),
        }
    }
}

/// Ledger status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Failed,
    Done,
    Rollback,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Failed => "failed",
            BatchStatus::Done => "done",
            BatchStatus::Rollback => "rollback",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failed" => Ok(BatchStatus::Failed),
            "done" => Ok(BatchStatus::Done),
            "rollback" => Ok(BatchStatus::Rollback),
            other => Err(EngineError::query(format!("Unknown batch status '{}' in ledger", other))),
        }
    }
}

/// One ledger row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub batch_id: String,
    pub env_name: String,
    pub operator: String,
    pub mode: BatchMode,
    pub created_at: DateTime<Utc>,
    pub total_rows: u64,
    pub status: BatchStatus,
}

impl Batch {
    fn from_row(row: &dyn DatabaseRow) -> EngineResult<Self> {
        let total_rows = row.required_i64("total_rows")?;
        Ok(Self {
            batch_id: row.required_text("batch_id")?,
            env_name: row.required_text("env_name")?,
            operator: row.required_text("operator")?,
            mode: row.required_text("mode")?.parse()?,
            created_at: parse_timestamp(&row.required_text("created_at")?)?,
            total_rows: u64::try_from(total_rows).map_err(|_| {
                EngineError::query(format!("Negative total_rows {} in ledger", total_rows))
            })?,
            status: row.required_text("status")?.parse()?,
        })
    }
}

/// Ledger table access
#[derive(Clone)]
pub struct BatchLedger {
    pool: Arc<dyn DatabasePool>,
    table: String,
}

impl BatchLedger {
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

    fn placeholders(&self, count: usize) -> Vec<String> {
        (0..count).map(|i| self.dialect().parameter_placeholder(i)).collect()
    }

    /// Create the ledger table when missing
    pub async fn ensure_schema(&self) -> EngineResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             batch_id VARCHAR(64) PRIMARY KEY, \
             env_name VARCHAR(128) NOT NULL, \
             operator VARCHAR(128) NOT NULL, \
             mode VARCHAR(16) NOT NULL, \
             created_at VARCHAR(32) NOT NULL, \
             total_rows BIGINT NOT NULL DEFAULT 0, \
             status VARCHAR(16) NOT NULL)",
            self.quoted_table()
        );
        self.pool.execute(&sql, &[]).await?;
        tracing::debug!(table = %self.table, "Ledger table ensured");
        Ok(())
    }

    /// Insert a fresh batch row with status `failed` and zero rows
    pub async fn open(
        &self,
        env_name: &str,
        operator: &str,
        mode: BatchMode,
    ) -> EngineResult<String> {
        let now = Utc::now();
        let batch_id = generate_batch_id(now);
        let sql = format!(
            "INSERT INTO {} (batch_id, env_name, operator, mode, created_at, total_rows, status) \
             VALUES ({})",
            self.quoted_table(),
            self.placeholders(7).join(", ")
        );
        let params = [
            DatabaseValue::from(batch_id.as_str()),
            env_name.into(),
            operator.into(),
            mode.as_str().into(),
            format_timestamp(now).into(),
            DatabaseValue::Int64(0),
            BatchStatus::Failed.as_str().into(),
        ];
        self.pool.execute(&sql, &params).await?;

        tracing::info!(
            batch_id = %batch_id,
            env = %env_name,
            operator = %operator,
            mode = %mode,
            "Batch opened"
        );
        Ok(batch_id)
    }

    /// Record the final row count and status of a batch
    pub async fn close(
        &self,
        batch_id: &str,
        total_rows: u64,
        status: BatchStatus,
    ) -> EngineResult<()> {
        let p = self.placeholders(3);
        let sql = format!(
            "UPDATE {} SET total_rows = {}, status = {} WHERE batch_id = {}",
            self.quoted_table(),
            p[0],
            p[1],
            p[2]
        );
        let total = i64::try_from(total_rows).map_err(|_| {
            EngineError::validation(format!("total_rows {} out of range", total_rows))
        })?;
        let params = [DatabaseValue::Int64(total), status.as_str().into(), batch_id.into()];

        let affected = self.pool.execute(&sql, &params).await?;
        if affected == 0 {
            return Err(EngineError::BatchNotFound {
                batch_id: batch_id.to_string(),
            });
        }

        tracing::info!(batch_id = %batch_id, total_rows, status = %status, "Batch closed");
        Ok(())
    }

    /// Flip a `done` batch to `rollback`. Returns false when the batch was
    /// no longer `done` (rolled back concurrently).
    pub async fn mark_rolled_back(&self, batch_id: &str) -> EngineResult<bool> {
        let p = self.placeholders(3);
        let sql = format!(
            "UPDATE {} SET status = {} WHERE batch_id = {} AND status = {}",
            self.quoted_table(),
            p[0],
            p[1],
            p[2]
        );
        let params = [
            DatabaseValue::from(BatchStatus::Rollback.as_str()),
            batch_id.into(),
            BatchStatus::Done.as_str().into(),
        ];

        Ok(self.pool.execute(&sql, &params).await? > 0)
    }

    /// Look up one batch
    pub async fn get(&self, batch_id: &str) -> EngineResult<Option<Batch>> {
        let sql = format!(
            "SELECT batch_id, env_name, operator, mode, created_at, total_rows, status \
             FROM {} WHERE batch_id = {}",
            self.quoted_table(),
            self.dialect().parameter_placeholder(0)
        );

        match self.pool.fetch_optional(&sql, &[DatabaseValue::from(batch_id)]).await? {
            Some(row) => Ok(Some(Batch::from_row(row.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Most recently created batches, newest first
    pub async fn list_recent(&self, limit: u32) -> EngineResult<Vec<Batch>> {
        let sql = format!(
            "SELECT batch_id, env_name, operator, mode, created_at, total_rows, status \
             FROM {} ORDER BY created_at DESC, batch_id DESC LIMIT {}",
            self.quoted_table(),
            limit
        );

        self.pool
            .fetch_all(&sql, &[])
            .await?
            .iter()
            .map(|row| Batch::from_row(row.as_ref()))
            .collect()
    }
}
