use anyhow::Result;
use console::style;

use super::CommandContext;

/// List configured environments and whether each one resolves
pub fn run(ctx: &CommandContext) -> Result<()> {
    let settings = &ctx.settings;
    let names = settings.environment_names();

    if names.is_empty() {
        println!("No environments configured");
        return Ok(());
    }

    for name in names {
        let marker = if settings.default_env.as_deref() == Some(name) {
            "*"
        } else {
            " "
        };
        match settings.resolve(Some(name)) {
            Ok(env) => println!(
                "{} {:<16} {}.{} ({}), log {} ({})",
                marker,
                style(name).cyan(),
                env.target.table,
                env.target.value_column,
                env.target.store.backend,
                env.log.ledger_table,
                env.log.store.backend
            ),
            Err(err) => println!(
                "{} {:<16} {} {}",
                marker,
                style(name).cyan(),
                style("invalid:").red(),
                err
            ),
        }
    }
    Ok(())
}
