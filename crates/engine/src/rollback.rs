//! Rollback Engine - reverse a recorded batch from its detail rows
//!
//! Only `done` batches with at least one recorded row qualify. Detail rows
//! are restored newest first, so a row the batch touched twice ends at its
//! original value. Each one is restored independently; rows changed again
//! since the batch ran are left alone and counted as failures. The batch ends as `rollback`
//! whatever the split, and a rolled-back batch cannot be rolled back again.

use serde::Serialize;

use crate::detail::{DetailRecord, DetailRecorder};
use crate::error::{EngineError, EngineResult};
use crate::executor::MutationExecutor;
use crate::ledger::{Batch, BatchLedger, BatchStatus};

/// Whether a batch may be rolled back, and why not
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackEligibility {
    Eligible,
    Ineligible(String),
}

impl RollbackEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, RollbackEligibility::Eligible)
    }
}

/// Apply the rollback gate: `status = done and total_rows > 0`
pub fn check_eligibility(batch: &Batch) -> RollbackEligibility {
    match batch.status {
        BatchStatus::Done if batch.total_rows > 0 => RollbackEligibility::Eligible,
        BatchStatus::Done => {
            RollbackEligibility::Ineligible("the batch changed no rows".to_string())
        }
        BatchStatus::Failed => RollbackEligibility::Ineligible(
            "the batch failed; inspect its detail rows before acting manually".to_string(),
        ),
        BatchStatus::Rollback => {
            RollbackEligibility::Ineligible("the batch has already been rolled back".to_string())
        }
    }
}

/// Outcome of a rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub batch_id: String,
    pub success_count: u64,
    pub fail_count: u64,
    /// Keys of rows that no longer held the batch's new value
    pub failed_row_ids: Vec<String>,
}

/// Lists, inspects and reverses batches
#[derive(Clone)]
pub struct RollbackEngine {
    ledger: BatchLedger,
    recorder: DetailRecorder,
    executor: MutationExecutor,
}

impl RollbackEngine {
    pub fn new(ledger: BatchLedger, recorder: DetailRecorder, executor: MutationExecutor) -> Self {
        Self {
            ledger,
            recorder,
            executor,
        }
    }

    /// Most recent batches, newest first
    pub async fn list_batches(&self, limit: u32) -> EngineResult<Vec<Batch>> {
        self.ledger.list_recent(limit).await
    }

    /// One batch by id
    pub async fn get_batch(&self, batch_id: &str) -> EngineResult<Batch> {
        self.ledger
            .get(batch_id)
            .await?
            .ok_or_else(|| EngineError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })
    }

    /// Detail rows of a batch in recording order
    pub async fn get_batch_details(&self, batch_id: &str) -> EngineResult<Vec<DetailRecord>> {
        self.recorder.for_batch(batch_id).await
    }

    /// Restore every recorded row of a batch and mark it `rollback`
    pub async fn rollback(&self, batch_id: &str) -> EngineResult<RollbackReport> {
        let batch = self.get_batch(batch_id).await?;

        if let RollbackEligibility::Ineligible(reason) = check_eligibility(&batch) {
            return Err(EngineError::RollbackRefused {
                batch_id: batch_id.to_string(),
                reason,
            });
        }

        let details = self.get_batch_details(batch_id).await?;
        if details.len() as u64 != batch.total_rows {
            tracing::warn!(
                batch_id = %batch_id,
                ledger_rows = batch.total_rows,
                detail_rows = details.len(),
                "Ledger row count disagrees with detail rows; rolling back the detail rows"
            );
        }

        let mut report = RollbackReport {
            batch_id: batch_id.to_string(),
            success_count: 0,
            fail_count: 0,
            failed_row_ids: Vec::new(),
        };

        for detail in details.iter().rev() {
            let restored = self
                .executor
                .restore(&detail.row_id, detail.old_name.as_deref(), &detail.new_name)
                .await?;

            if restored {
                report.success_count += 1;
            } else {
                tracing::warn!(
                    batch_id = %batch_id,
                    row_id = %detail.row_id,
                    seq = detail.seq,
                    "Row changed since the batch ran; not restored"
                );
                report.fail_count += 1;
                report.failed_row_ids.push(detail.row_id.clone());
            }
        }

        if !self.ledger.mark_rolled_back(batch_id).await? {
            tracing::warn!(
                batch_id = %batch_id,
                "Batch was no longer 'done' when closing the rollback"
            );
        }

        tracing::info!(
            batch_id = %batch_id,
            success = report.success_count,
            failed = report.fail_count,
            "Batch rolled back"
        );
        Ok(report)
    }
}
