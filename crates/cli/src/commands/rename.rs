use anyhow::Result;
use console::style;
use relabel_engine::{MutationRequest, StoreSession};

use super::{predicate_from_flags, CommandContext};

/// Rename the rows matched by `--key` or `--old-name`
pub async fn run(
    ctx: &CommandContext,
    operator: &str,
    key: Option<&str>,
    old_name: Option<&str>,
    new_name: &str,
) -> Result<()> {
    let request = MutationRequest::from_parts(key, old_name, new_name)?;

    let session = ctx.open_session().await?;
    let result = rename(&session, operator, &request).await;
    session.close().await;
    result
}

async fn rename(session: &StoreSession, operator: &str, request: &MutationRequest) -> Result<()> {
    let outcome = session.orchestrator().execute_single(operator, request).await?;

    if outcome.matched_count == 0 {
        println!(
            "{} No rows matched {}. Batch {} recorded with 0 rows.",
            style("!").yellow(),
            request.predicate,
            style(&outcome.batch_id).cyan()
        );
    } else {
        println!(
            "{} Renamed {} row(s) to '{}'. Batch {}",
            style("✓").green(),
            outcome.matched_count,
            request.new_value,
            style(&outcome.batch_id).cyan()
        );
    }
    Ok(())
}

/// Show the rows a rename would change, without changing them
pub async fn preview(
    ctx: &CommandContext,
    key: Option<&str>,
    old_name: Option<&str>,
) -> Result<()> {
    let predicate = predicate_from_flags(key, old_name)?;

    let session = ctx.open_session().await?;
    let result = session.orchestrator().preview(&predicate).await;
    session.close().await;
    let rows = result?;

    if rows.is_empty() {
        println!("No rows match {}", predicate);
        return Ok(());
    }

    println!("{} row(s) match {}:", rows.len(), predicate);
    println!("  {:<24} {}", style("KEY").bold(), style("CURRENT VALUE").bold());
    for row in &rows {
        println!("  {:<24} {}", row.row_key, row.current_value.as_deref().unwrap_or("NULL"));
    }
    Ok(())
}
