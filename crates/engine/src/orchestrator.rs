//! Batch Orchestrator - single and bulk rename workflows
//!
//! Every workflow is a saga over two stores without a shared transaction:
//!
//! 1. open the ledger row (`failed`, 0 rows)
//! 2. per unit: snapshot target rows, commit their detail rows, update the target
//! 3. close the ledger row (`done`, rows recorded)
//!
//! Commits are sequenced so a crash leaves the audit trail ahead of the
//! target table, never behind it. On a store error the batch is closed as
//! `failed` on a best-effort basis and the error is returned.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;

use crate::detail::{DetailRecorder, DetailRow};
use crate::error::{EngineError, EngineResult};
use crate::executor::{AffectedRow, MatchPredicate, MutationExecutor, SnapshotSink};
use crate::ledger::{BatchLedger, BatchMode, BatchStatus};

/// Width of the ledger's operator column
const MAX_OPERATOR_LEN: usize = 128;

/// One rename: which rows, and what their value becomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub predicate: MatchPredicate,
    pub new_value: String,
}

impl MutationRequest {
    pub fn new(predicate: MatchPredicate, new_value: impl Into<String>) -> Self {
        Self {
            predicate,
            new_value: new_value.into(),
        }
    }

    /// Build a request from optional inputs; the row key wins over the old value
    pub fn from_parts(
        row_key: Option<&str>,
        old_value: Option<&str>,
        new_value: &str,
    ) -> EngineResult<Self> {
        let predicate = MatchPredicate::resolve(row_key, old_value).ok_or_else(|| {
            EngineError::validation("Either a row key or the current value is required")
        })?;

        if new_value.trim().is_empty() {
            return Err(EngineError::validation("The new value cannot be empty"));
        }

        Ok(Self::new(predicate, new_value))
    }
}

/// One row of tabular bulk input, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRow {
    /// 1-based position in the source, for warnings
    pub line: usize,
    pub row_key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl BulkRow {
    /// Turn the row into a request, or explain why it is skipped
    pub fn validate(&self) -> Result<MutationRequest, RowWarning> {
        let predicate = MatchPredicate::resolve(self.row_key.as_deref(), self.old_value.as_deref());
        let new_value = self.new_value.as_deref().filter(|v| !v.trim().is_empty());

        let reason = match (predicate, new_value) {
            (Some(predicate), Some(new_value)) => {
                return Ok(MutationRequest::new(predicate, new_value));
            }
            (None, Some(_)) => SkipReason::MissingPredicate,
            (Some(_), None) => SkipReason::MissingNewValue,
            (None, None) => SkipReason::MissingPredicateAndNewValue,
        };

        Err(RowWarning {
            line: self.line,
            reason,
        })
    }
}

/// Why a bulk row was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPredicate,
    MissingNewValue,
    MissingPredicateAndNewValue,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPredicate => write!(f, "neither row key nor old value given"),
            SkipReason::MissingNewValue => write!(f, "new value missing"),
            SkipReason::MissingPredicateAndNewValue => {
                write!(f, "neither row key nor old value given, and new value missing")
            }
        }
    }
}

/// A skipped bulk row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWarning {
    pub line: usize,
    pub reason: SkipReason,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Split bulk input into runnable requests (with their line) and warnings
pub fn prepare_rows(rows: &[BulkRow]) -> (Vec<(usize, MutationRequest)>, Vec<RowWarning>) {
    let mut requests = Vec::new();
    let mut warnings = Vec::new();

    for row in rows {
        match row.validate() {
            Ok(request) => requests.push((row.line, request)),
            Err(warning) => warnings.push(warning),
        }
    }

    (requests, warnings)
}

/// Incremental progress of a bulk run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub matched_so_far: u64,
}

/// Result of a single-record rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOutcome {
    pub batch_id: String,
    pub matched_count: u64,
}

/// Result of a bulk rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub total_matched: u64,
    pub processed_rows: usize,
    pub warnings: Vec<RowWarning>,
}

/// Stage of the batch protocol, reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Opening,
    Selecting,
    Recording,
    Updating,
    Closing,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Opening => "opening",
            OperationState::Selecting => "selecting",
            OperationState::Recording => "recording",
            OperationState::Updating => "updating",
            OperationState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Persists a snapshot as the detail rows of one batch
struct DetailSink<'a> {
    recorder: &'a DetailRecorder,
    batch_id: &'a str,
    /// Sequence number of the snapshot's first row within the batch
    first_seq: u64,
}

#[async_trait]
impl<'a> SnapshotSink for DetailSink<'a> {
    async fn persist(&self, snapshot: &[AffectedRow], new_value: &str) -> EngineResult<()> {
        tracing::debug!(
            batch_id = %self.batch_id,
            state = %OperationState::Recording,
            rows = snapshot.len()
        );

        let updated_at = Utc::now();
        let rows: Vec<DetailRow> = snapshot
            .iter()
            .zip(self.first_seq..)
            .map(|(row, seq)| DetailRow {
                seq,
                row_key: row.row_key.clone(),
                old_value: row.current_value.clone(),
                new_value: new_value.to_string(),
                updated_at,
            })
            .collect();

        let written = self.recorder.record(self.batch_id, &rows).await?;
        if written != rows.len() as u64 {
            return Err(EngineError::query(format!(
                "Detail store acknowledged {} of {} rows",
                written,
                rows.len()
            )));
        }

        if !rows.is_empty() {
            tracing::debug!(
                batch_id = %self.batch_id,
                state = %OperationState::Updating,
                rows = rows.len()
            );
        }
        Ok(())
    }
}

/// Drives the batch protocol for one environment
#[derive(Clone)]
pub struct BatchOrchestrator {
    env_name: String,
    ledger: BatchLedger,
    recorder: DetailRecorder,
    executor: MutationExecutor,
}

impl BatchOrchestrator {
    pub fn new(
        env_name: impl Into<String>,
        ledger: BatchLedger,
        recorder: DetailRecorder,
        executor: MutationExecutor,
    ) -> Self {
        Self {
            env_name: env_name.into(),
            ledger,
            recorder,
            executor,
        }
    }

    /// Rows a request would change, without opening a batch
    pub async fn preview(&self, predicate: &MatchPredicate) -> EngineResult<Vec<AffectedRow>> {
        self.executor.snapshot(predicate).await
    }

    /// Rename the rows matched by one request
    pub async fn execute_single(
        &self,
        operator: &str,
        request: &MutationRequest,
    ) -> EngineResult<SingleOutcome> {
        let operator = require_operator(operator)?;

        tracing::debug!(env = %self.env_name, state = %OperationState::Opening);
        let batch_id = self.ledger.open(&self.env_name, operator, BatchMode::Single).await?;

        let matched_count = match self.apply_unit(&batch_id, request, 1).await {
            Ok(matched) => matched,
            Err(err) => {
                tracing::error!(batch_id = %batch_id, error = %err, "Rename failed");
                self.abandon(&batch_id).await;
                return Err(err);
            }
        };

        self.finish(&batch_id, matched_count).await?;

        Ok(SingleOutcome {
            batch_id,
            matched_count,
        })
    }

    /// Rename row by row from bulk input under one batch.
    ///
    /// Invalid rows are skipped and reported. The first store error stops the
    /// run; rows already applied stay applied and keep their detail rows.
    pub async fn execute_batch<F>(
        &self,
        operator: &str,
        rows: &[BulkRow],
        mut on_progress: F,
    ) -> EngineResult<BatchOutcome>
    where
        F: FnMut(&BatchProgress),
    {
        let operator = require_operator(operator)?;
        let (requests, warnings) = prepare_rows(rows);

        for warning in &warnings {
            tracing::warn!(line = warning.line, reason = %warning.reason, "Bulk row skipped");
        }

        tracing::debug!(
            env = %self.env_name,
            state = %OperationState::Opening,
            rows = requests.len()
        );
        let batch_id = self.ledger.open(&self.env_name, operator, BatchMode::Batch).await?;

        let mut total_matched = 0u64;
        for (index, (line, request)) in requests.iter().enumerate() {
            match self.apply_unit(&batch_id, request, total_matched + 1).await {
                Ok(matched) => total_matched += matched,
                Err(err) => {
                    tracing::error!(batch_id = %batch_id, line, error = %err, "Bulk rename failed");
                    self.abandon(&batch_id).await;
                    return Err(err);
                }
            }

            on_progress(&BatchProgress {
                processed: index + 1,
                total: requests.len(),
                matched_so_far: total_matched,
            });
        }

        self.finish(&batch_id, total_matched).await?;

        Ok(BatchOutcome {
            batch_id,
            total_matched,
            processed_rows: requests.len(),
            warnings,
        })
    }

    /// Run one request; its detail rows are numbered from `first_seq`
    async fn apply_unit(
        &self,
        batch_id: &str,
        request: &MutationRequest,
        first_seq: u64,
    ) -> EngineResult<u64> {
        tracing::debug!(
            batch_id = %batch_id,
            state = %OperationState::Selecting,
            predicate = %request.predicate
        );

        let sink = DetailSink {
            recorder: &self.recorder,
            batch_id,
            first_seq,
        };
        let outcome = self
            .executor
            .select_then_update(&request.predicate, &request.new_value, &sink)
            .await?;

        Ok(outcome.matched_count)
    }

    async fn finish(&self, batch_id: &str, total_rows: u64) -> EngineResult<()> {
        tracing::debug!(batch_id = %batch_id, state = %OperationState::Closing, total_rows);

        if let Err(err) = self.ledger.close(batch_id, total_rows, BatchStatus::Done).await {
            tracing::error!(
                batch_id = %batch_id,
                total_rows,
                error = %err,
                "Target updated and detail rows recorded, but the batch could not be marked done"
            );
            return Err(err);
        }
        Ok(())
    }

    /// Best-effort close as `failed`; the row is already `failed` by default
    async fn abandon(&self, batch_id: &str) {
        if let Err(err) = self.ledger.close(batch_id, 0, BatchStatus::Failed).await {
            tracing::warn!(
                batch_id = %batch_id,
                error = %err,
                "Could not mark batch failed; it keeps its default status"
            );
        }
    }
}

fn require_operator(operator: &str) -> EngineResult<&str> {
    let operator = operator.trim();
    if operator.is_empty() {
        return Err(EngineError::validation("An operator name is required"));
    }
    if operator.chars().count() > MAX_OPERATOR_LEN {
        return Err(EngineError::validation(format!(
            "Operator name longer than {} characters",
            MAX_OPERATOR_LEN
        )));
    }
    Ok(operator)
}
