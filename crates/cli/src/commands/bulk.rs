use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::CommandContext;
use crate::input::{read_bulk_rows, write_template};

/// Rename row by row from a CSV file under one batch
pub async fn run(ctx: &CommandContext, operator: &str, file: &Path) -> Result<()> {
    let rows = read_bulk_rows(file)?;
    if rows.is_empty() {
        bail!("{} has no data rows", file.display());
    }

    let session = ctx.open_session().await?;

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} rows {msg}")
            .context("Invalid progress template")?,
    );

    let result = session
        .orchestrator()
        .execute_batch(operator, &rows, |p| {
            progress.set_length(p.total as u64);
            progress.set_position(p.processed as u64);
            progress.set_message(format!("({} matched)", p.matched_so_far));
        })
        .await;
    progress.finish_and_clear();
    session.close().await;
    let outcome = result?;

    println!(
        "{} Processed {} row(s), {} record(s) renamed. Batch {}",
        style("✓").green(),
        outcome.processed_rows,
        outcome.total_matched,
        style(&outcome.batch_id).cyan()
    );

    if !outcome.warnings.is_empty() {
        println!("{} {} row(s) skipped:", style("!").yellow(), outcome.warnings.len());
        for warning in &outcome.warnings {
            println!("  {}", warning);
        }
    }
    Ok(())
}

/// Write an empty bulk-input template to `output`, or stdout
pub fn template(output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .with_context(|| format!("Refusing to write {}", path.display()))?;
            write_template(file)?;
            println!("Template written to {}", path.display());
        }
        None => write_template(io::stdout().lock())?,
    }
    Ok(())
}
