use anyhow::{Context, Result};
use console::style;
use inquire::Confirm;
use relabel_engine::{check_eligibility, EngineError, RollbackEligibility, StoreSession};

use super::CommandContext;

/// Reverse a batch after showing what it changed
pub async fn run(ctx: &CommandContext, batch_id: &str, assume_yes: bool) -> Result<()> {
    let session = ctx.open_session().await?;
    let result = rollback(&session, batch_id, assume_yes).await;
    session.close().await;
    result
}

async fn rollback(session: &StoreSession, batch_id: &str, assume_yes: bool) -> Result<()> {
    let engine = session.rollback_engine();
    let batch = engine.get_batch(batch_id).await?;

    println!(
        "Batch {} by {} on {}: {} row(s), status {}",
        style(&batch.batch_id).cyan(),
        batch.operator,
        batch.env_name,
        batch.total_rows,
        batch.status
    );

    if let RollbackEligibility::Ineligible(reason) = check_eligibility(&batch) {
        return Err(EngineError::RollbackRefused {
            batch_id: batch.batch_id,
            reason,
        }
        .into());
    }

    if !assume_yes {
        let question = format!(
            "Restore the {} row(s) changed by this batch?",
            batch.total_rows
        );
        let confirmed = Confirm::new(&question)
            .with_default(false)
            .with_help_message("Rows changed again since the batch ran are left alone")
            .prompt()
            .context("Failed to get confirmation")?;

        if !confirmed {
            println!("Rollback cancelled");
            return Ok(());
        }
    }

    let report = engine.rollback(batch_id).await?;

    println!(
        "{} Restored {} row(s), {} not restored. Batch {} is now rolled back.",
        style("✓").green(),
        report.success_count,
        report.fail_count,
        style(&report.batch_id).cyan()
    );
    if !report.failed_row_ids.is_empty() {
        println!(
            "{} Rows changed since the batch ran: {}",
            style("!").yellow(),
            report.failed_row_ids.join(", ")
        );
    }
    Ok(())
}
