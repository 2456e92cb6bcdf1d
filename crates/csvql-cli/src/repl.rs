//! Interactive REPL mode for csvql
//!
//! Provides a rustyline-based interactive shell with:
//! - Command history (up/down arrows), persisted under ~/.csvql
//! - Multi-line input: end a line with `\` to continue it
//! - Shell commands for the header cache and output format

use anyhow::Result;
use csvql_sql::QueryEngine;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

use crate::config::{csvql_home, Config, OutputFormat};
use crate::format::Formatter;

const PROMPT: &str = "csvql> ";
const CONTINUATION_PROMPT: &str = "   ..> ";

/// A parsed line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Help,
    CacheList,
    CacheClear,
    CacheInvalidate(String),
    Format(OutputFormat),
    ConfigSave,
    /// Malformed shell command; carries the usage message
    Usage(&'static str),
    Query(String),
}

/// Classify one complete line of input.
///
/// Anything that isn't a shell command is handed to the engine as a query.
pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        ["exit"] | ["quit"] | ["\\q"] => ReplCommand::Exit,
        ["help"] | ["\\h"] => ReplCommand::Help,
        ["cache"] | ["cache", "list"] => ReplCommand::CacheList,
        ["cache", "clear"] => ReplCommand::CacheClear,
        ["cache", "invalidate", alias] => ReplCommand::CacheInvalidate(alias.to_string()),
        ["cache", ..] => ReplCommand::Usage("cache [list|clear|invalidate <alias>]"),
        ["format", name] => match name.parse() {
            Ok(format) => ReplCommand::Format(format),
            Err(_) => ReplCommand::Usage("format <table|json>"),
        },
        ["format", ..] => ReplCommand::Usage("format <table|json>"),
        ["config", "save"] => ReplCommand::ConfigSave,
        ["config", ..] => ReplCommand::Usage("config save"),
        _ => ReplCommand::Query(line.trim_end_matches(';').to_string()),
    }
}

/// REPL context holding the engine and editor
pub struct Repl {
    engine: QueryEngine,
    formatter: Formatter,
    config: Config,
    editor: DefaultEditor,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(engine: QueryEngine, formatter: Formatter, config: Config) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;

        let history_path = Self::history_path();
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }

        Ok(Self {
            engine,
            formatter,
            config,
            editor,
        })
    }

    /// Run the interactive REPL loop
    pub async fn run(&mut self) -> Result<()> {
        println!("csvql interactive shell");
        println!("Type 'help' for available commands, 'exit' or Ctrl+D to quit");
        println!();

        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            };

            match self.editor.readline(prompt) {
                Ok(line) => {
                    if let Some(partial) = line.trim_end().strip_suffix('\\') {
                        buffer.push_str(partial);
                        buffer.push('\n');
                        continue;
                    }
                    buffer.push_str(&line);

                    let input = std::mem::take(&mut buffer);
                    let input = input.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(input);

                    match parse_command(input) {
                        ReplCommand::Exit => break,
                        command => {
                            if let Err(e) = self.execute(command).await {
                                self.formatter.print_error(&format!("{:#}", e));
                            }
                        }
                    }
                    println!();
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C drops any pending continuation lines
                    println!("^C");
                    buffer.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("exit");
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading line: {}", err);
                    break;
                }
            }
        }

        let history_path = Self::history_path();
        if let Some(parent) = history_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.editor.save_history(&history_path)?;

        println!("Goodbye!");
        Ok(())
    }

    async fn execute(&mut self, command: ReplCommand) -> Result<()> {
        match command {
            ReplCommand::Exit => {}
            ReplCommand::Help => Self::print_help(),
            ReplCommand::CacheList => {
                let aliases = self.engine.cached_aliases().await;
                if aliases.is_empty() {
                    self.formatter.print_info("No cached files");
                } else {
                    for alias in aliases {
                        println!("  {}", alias);
                    }
                }
            }
            ReplCommand::CacheClear => {
                self.engine.clear_cache().await;
                self.formatter.print_info("Cache cleared");
            }
            ReplCommand::CacheInvalidate(alias) => {
                if self.engine.invalidate(&alias).await {
                    self.formatter
                        .print_info(&format!("Dropped cached header for '{}'", alias));
                } else {
                    self.formatter
                        .print_warning(&format!("No cached header for '{}'", alias));
                }
            }
            ReplCommand::Format(format) => {
                if self.formatter.format() == format {
                    return Ok(());
                }
                self.formatter.set_format(format);
                self.config.output_format = format;
                let name = match format {
                    OutputFormat::Table => "table",
                    OutputFormat::Json => "json",
                };
                self.formatter
                    .print_info(&format!("Output format set to {}", name));
            }
            ReplCommand::ConfigSave => {
                self.config.save()?;
                self.formatter.print_info(&format!(
                    "Saved config to {}",
                    Config::config_path().display()
                ));
            }
            ReplCommand::Usage(usage) => println!("Usage: {}", usage),
            ReplCommand::Query(sql) => {
                crate::run_query(&self.engine, &self.formatter, &sql).await?;
            }
        }
        Ok(())
    }

    fn history_path() -> PathBuf {
        csvql_home().join("history")
    }

    fn print_help() {
        println!("Available commands:");
        println!();
        println!("  Queries:");
        println!("    SELECT <cols|*> FROM path:<file.csv> AS <alias>");
        println!("      [WHERE '<alias>.<col>'[::int|::float] <op> '<value>' [AND|OR ...]]");
        println!("      [ORDER BY '<alias>.<col>' [ASC|DESC], ...] [LIMIT n] [OFFSET n]");
        println!("    End a line with \\ to continue on the next line");
        println!();
        println!("  Header Cache:");
        println!("    cache list");
        println!("    cache clear");
        println!("    cache invalidate <alias>");
        println!();
        println!("  Settings:");
        println!("    format <table|json>");
        println!("    config save");
        println!();
        println!("  Other:");
        println!("    help");
        println!("    exit, quit");
    }
}
