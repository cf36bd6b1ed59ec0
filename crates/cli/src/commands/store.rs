use anyhow::Result;
use console::style;
use relabel_engine::backends::any::redact_url;

use super::CommandContext;

/// Create the ledger and detail tables when missing
pub async fn init(ctx: &CommandContext) -> Result<()> {
    let session = ctx.open_session().await?;
    let result = session.ensure_log_schema().await;
    let log = &session.environment().log;
    let (ledger, detail) = (log.ledger_table.clone(), log.detail_table.clone());
    session.close().await;
    result?;

    println!(
        "{} Log tables ready: {}, {}",
        style("✓").green(),
        style(ledger).cyan(),
        style(detail).cyan()
    );
    Ok(())
}

/// Connect to both stores and report round-trip times
pub async fn check(ctx: &CommandContext) -> Result<()> {
    let env = ctx.environment()?;
    println!("Environment {}", style(&env.name).cyan());
    println!("  target  {}", redact_url(&env.target.store.database_url()?));
    println!("  log     {}", redact_url(&env.log.store.database_url()?));

    let session = ctx.open_session().await?;
    let result = session.health_check().await;
    session.close().await;
    let health = result?;

    println!(
        "{} target store answered in {} ms, log store in {} ms",
        style("✓").green(),
        health.target.as_millis(),
        health.log.as_millis()
    );
    Ok(())
}
