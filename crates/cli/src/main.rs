mod commands;
mod config;
mod input;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use relabel_engine::EngineError;

use commands::*;
use config::{Settings, DEFAULT_CONFIG_PATH};
use logging::{init_logging, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(name = "relabel")]
#[command(about = "Rename values in a table with a batch audit trail and rollback")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Environment to act on (defaults to default_env)
    #[arg(long, short, global = true)]
    env: Option<String>,

    /// Log level or filter directive, e.g. "debug" or "relabel_engine=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename the rows matched by a key or by their current value
    Rename {
        /// Who is making the change, recorded in the ledger
        #[arg(long)]
        operator: String,

        /// Value to write
        #[arg(long)]
        new_name: String,

        /// Match the row with this key (wins over --old-name)
        #[arg(long)]
        key: Option<String>,

        /// Match every row currently holding this value
        #[arg(long)]
        old_name: Option<String>,
    },

    /// Rename from a CSV file (row_key,old_value,new_value) under one batch
    Bulk {
        /// Who is making the change, recorded in the ledger
        #[arg(long)]
        operator: String,

        /// CSV input
        #[arg(long)]
        file: PathBuf,
    },

    /// Show the rows a rename would touch, without changing them
    Preview {
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        old_name: Option<String>,
    },

    /// List recent batches
    Batches {
        #[arg(long, default_value = "20")]
        limit: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one batch and its recorded rows
    Details {
        batch_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restore the values a batch replaced
    Rollback {
        batch_id: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Create the ledger and detail tables when missing
    Init,

    /// Check connectivity to both stores
    Check,

    /// Write an empty CSV template for bulk input
    Template {
        /// Destination file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List configured environments
    Envs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // The template needs neither configuration nor logging
    if let Commands::Template { output } = &cli.command {
        return bulk::template(output.as_deref());
    }

    let settings = Settings::load(&cli.config)?;

    let logging = LoggingConfig::layered(
        cli.log_level.as_deref(),
        cli.log_format,
        settings.logging.level.as_deref(),
        settings.logging.format,
    );
    init_logging(&logging).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let ctx = CommandContext {
        settings,
        env: cli.env,
    };

    match cli.command {
        Commands::Rename {
            operator,
            new_name,
            key,
            old_name,
        } => rename::run(&ctx, &operator, key.as_deref(), old_name.as_deref(), &new_name).await,
        Commands::Bulk { operator, file } => bulk::run(&ctx, &operator, &file).await,
        Commands::Preview { key, old_name } => {
            rename::preview(&ctx, key.as_deref(), old_name.as_deref()).await
        }
        Commands::Batches { limit, json } => history::batches(&ctx, limit, json).await,
        Commands::Details { batch_id, json } => history::details(&ctx, &batch_id, json).await,
        Commands::Rollback { batch_id, yes } => rollback::run(&ctx, &batch_id, yes).await,
        Commands::Init => store::init(&ctx).await,
        Commands::Check => store::check(&ctx).await,
        Commands::Envs => envs::run(&ctx),
        Commands::Template { .. } => Ok(()),
    }
}

fn report(err: &anyhow::Error) {
    eprintln!("{} {}", style("error:").red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }

    if let Some(hint) = err.downcast_ref::<EngineError>().and_then(EngineError::hint) {
        eprintln!("  {} {}", style("hint:").cyan(), hint);
    }
}
