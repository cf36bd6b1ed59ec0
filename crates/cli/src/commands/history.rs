use anyhow::Result;
use console::style;
use relabel_engine::{BatchStatus, StoreSession};

use super::CommandContext;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// List recent batches, newest first
pub async fn batches(ctx: &CommandContext, limit: u32, json: bool) -> Result<()> {
    let session = ctx.open_session().await?;
    let result = session.rollback_engine().list_batches(limit).await;
    session.close().await;
    let batches = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(());
    }

    if batches.is_empty() {
        println!("No batches recorded yet");
        return Ok(());
    }

    println!(
        "{:<26} {:<20} {:<7} {:<9} {:>6}  {}",
        "BATCH", "CREATED (UTC)", "MODE", "STATUS", "ROWS", "OPERATOR"
    );
    for batch in &batches {
        let status = match batch.status {
            BatchStatus::Done => style(batch.status.as_str()).green(),
            BatchStatus::Failed => style(batch.status.as_str()).red(),
            BatchStatus::Rollback => style(batch.status.as_str()).yellow(),
        };
        println!(
            "{:<26} {:<20} {:<7} {:<9} {:>6}  {}",
            batch.batch_id,
            batch.created_at.format(TIME_FORMAT),
            batch.mode,
            status,
            batch.total_rows,
            batch.operator
        );
    }
    Ok(())
}

/// Show one batch and its detail rows
pub async fn details(ctx: &CommandContext, batch_id: &str, json: bool) -> Result<()> {
    let session = ctx.open_session().await?;
    let result = show_details(&session, batch_id, json).await;
    session.close().await;
    result
}

async fn show_details(session: &StoreSession, batch_id: &str, json: bool) -> Result<()> {
    let engine = session.rollback_engine();
    let batch = engine.get_batch(batch_id).await?;
    let details = engine.get_batch_details(batch_id).await?;

    if json {
        let body = serde_json::json!({ "batch": batch, "details": details });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Batch     {}", style(&batch.batch_id).cyan());
    println!("Env       {}", batch.env_name);
    println!("Operator  {}", batch.operator);
    println!("Mode      {}", batch.mode);
    println!("Created   {} UTC", batch.created_at.format(TIME_FORMAT));
    println!("Status    {}", batch.status);
    println!("Rows      {} (detail rows: {})", batch.total_rows, details.len());

    if !details.is_empty() {
        println!();
        println!("{:>5}  {:<24} {:<30} {}", "#", "ROW", "OLD", "NEW");
        for detail in &details {
            println!(
                "{:>5}  {:<24} {:<30} {}",
                detail.seq,
                detail.row_id,
                detail.old_name.as_deref().unwrap_or("NULL"),
                detail.new_name
            );
        }
    }
    Ok(())
}
