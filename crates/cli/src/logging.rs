//! Structured logging setup
//!
//! Logs go to stderr so that command output on stdout can be piped.
//! `RUST_LOG` overrides the configured level when set.

use std::io;
use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (pretty, compact or json)", other)),
        }
    }
}

/// Logging configuration for the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level or filter directive (e.g. "info", "relabel_engine=debug")
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    /// Flags win over the file, the file wins over defaults
    pub fn layered(
        flag_level: Option<&str>,
        flag_format: Option<LogFormat>,
        file_level: Option<&str>,
        file_format: Option<LogFormat>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            level: flag_level.or(file_level).map(str::to_string).unwrap_or(defaults.level),
            format: flag_format.or(file_format).unwrap_or(defaults.format),
        }
    }
}

/// Install the global subscriber
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).compact())
            .try_init()?,
    }

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}
