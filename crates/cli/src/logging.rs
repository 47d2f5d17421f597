//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from the `--log-level` flag, then the `LABFLOW_LOG`
//! environment variable (any `EnvFilter` directive, e.g.
//! `labflow_execution=debug`), then defaults to `info`.

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the default log filter.
pub const LOG_ENV: &str = "LABFLOW_LOG";

/// Log level accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Install the global subscriber. Logs go to stderr so command output stays clean.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directive = filter_directive(cli_level, std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter [{}]", directive))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

fn filter_directive(cli_level: Option<LogLevel>, env: Option<String>) -> String {
    match cli_level {
        Some(level) => level.as_directive().to_string(),
        None => env
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "info".to_string()),
    }
}
