//! csvql command-line tool
//!
//! Runs SQL-like queries against CSV files.
//!
//! ## Overview
//!
//! `csvql` runs one query and exits, or starts an interactive shell when no
//! query is given:
//! - **One-shot**: `csvql "<query>"` prints the result and exits non-zero
//!   when the query fails
//! - **Interactive**: `csvql` opens a shell with history and keeps file
//!   headers cached between queries
//!
//! ## Quick Start
//!
//! ```bash
//! # Every column of every row
//! csvql "SELECT * FROM path:data/survey.csv AS e"
//!
//! # Typed filter, JSON output
//! csvql --format json \
//!   "SELECT 'e.Year', 'e.Value' FROM path:data/survey.csv AS e WHERE 'e.Year'::int > '2013' LIMIT 5"
//!
//! # Interactive shell
//! csvql
//! ```
//!
//! ## Configuration
//!
//! Settings are read from `~/.csvql/config.toml` and can be overridden with
//! flags or environment variables:
//! - `CSVQL_FORMAT`: Output format, `table` or `json` (default: table)
//! - `CSVQL_QUERY_TIMEOUT_MS`: Query deadline (default: 60000)
//! - `CSVQL_MAX_ROWS`: Cap on printed rows
//! - `RUST_LOG`: Log level for diagnostics on stderr (default: warn)
//!
//! ## Error Handling
//!
//! Query errors are printed to stderr, one per line. A query that runs out of
//! time prints its partial result followed by a warning.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use csvql_sql::QueryEngine;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod format;
mod repl;

use config::{Config, OutputFormat};
use format::Formatter;

#[derive(Parser)]
#[command(name = "csvql", version)]
#[command(about = "Query CSV files with SQL-like expressions", long_about = None)]
struct Cli {
    /// Query to run; starts the interactive shell when omitted
    query: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, env = "CSVQL_FORMAT")]
    format: Option<OutputFormat>,

    /// Query deadline in milliseconds
    #[arg(short, long, env = "CSVQL_QUERY_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Maximum number of rows to print
    #[arg(long, env = "CSVQL_MAX_ROWS")]
    max_rows: Option<usize>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Config file (default: ~/.csvql/config.toml)
    #[arg(long, env = "CSVQL_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Flags and environment take precedence over the config file.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.query_timeout_ms = timeout_ms;
        }
        if self.max_rows.is_some() {
            config.max_rows = self.max_rows;
        }
        if self.no_color {
            config.colored = false;
        }
        config
    }
}

fn init_tracing() -> Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "warn".to_string())
        .parse()
        .unwrap_or(Level::WARN);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

/// Main entry point for the CLI.
///
/// Loads the config, applies flag overrides, then either runs the given
/// query or enters the interactive shell.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load config")?;
    let config = cli.apply(config);
    debug!(?config, "configuration loaded");

    if !config.colored {
        colored::control::set_override(false);
    }

    let engine = QueryEngine::new(config.engine_config());
    let formatter = Formatter::new(config.output_format, config.colored);

    match cli.query {
        Some(sql) => {
            let succeeded = run_query(&engine, &formatter, &sql).await?;
            Ok(if succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => {
            let mut repl = repl::Repl::new(engine, formatter, config)?;
            repl.run().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one query and print its outcome. Returns `false` if it failed.
pub async fn run_query(engine: &QueryEngine, formatter: &Formatter, sql: &str) -> Result<bool> {
    let sql = sql.trim().trim_end_matches(';');
    let outcome = engine.run(sql).await;
    formatter.print_outcome(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_query_and_flags() {
        let cli = Cli::try_parse_from([
            "csvql",
            "--format",
            "json",
            "--timeout-ms",
            "250",
            "--no-color",
            "SELECT * FROM path:t.csv AS e",
        ])
        .unwrap();

        assert_eq!(cli.query.as_deref(), Some("SELECT * FROM path:t.csv AS e"));
        let config = cli.apply(Config::default());
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.query_timeout_ms, 250);
        assert!(!config.colored);
    }

    #[test]
    fn test_flags_leave_config_alone_when_absent() {
        let cli = Cli::try_parse_from(["csvql"]).unwrap();
        let config = Config {
            output_format: OutputFormat::Json,
            max_rows: Some(9),
            ..Default::default()
        };
        assert_eq!(cli.apply(config.clone()), config);
    }

    #[test]
    fn test_invalid_format_is_rejected() {
        assert!(Cli::try_parse_from(["csvql", "--format", "yaml"]).is_err());
    }
}
