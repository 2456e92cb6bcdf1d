//! Output formatting for csvql
//!
//! Supports two output formats:
//! - Table: ASCII table with rounded borders (default)
//! - JSON: array of objects, keys in selected-column order
//!
//! Results go to stdout. Errors, warnings and the row-count summary go to
//! stderr so piped output stays clean.

use crate::config::OutputFormat;
use anyhow::Result;
use colored::*;
use csvql_sql::{QueryOutcome, SqlError};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    /// Print a query outcome: rows on success, errors otherwise.
    ///
    /// Returns `false` when the query failed.
    pub fn print_outcome(&self, outcome: &QueryOutcome) -> Result<bool> {
        if outcome.has_errors() {
            self.print_errors(&outcome.errors);
            return Ok(false);
        }

        println!("{}", self.render(outcome)?);

        if outcome.deadline_exceeded {
            self.print_warning("Query deadline exceeded, showing partial results");
        }
        eprintln!(
            "({} {} in {}ms)",
            outcome.row_count(),
            if outcome.row_count() == 1 { "row" } else { "rows" },
            outcome.execution_time_ms
        );
        Ok(true)
    }

    /// Render the rows of a successful outcome in the configured format
    pub fn render(&self, outcome: &QueryOutcome) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(render_table(outcome)),
            OutputFormat::Json => render_json(outcome),
        }
    }

    pub fn print_errors(&self, errors: &[SqlError]) {
        for error in errors {
            self.print_error(&error.to_string());
        }
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "error:".red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        } else {
            eprintln!("warning: {}", message);
        }
    }

    /// Print an info message
    pub fn print_info(&self, message: &str) {
        if self.colored {
            println!("{}", message.blue());
        } else {
            println!("{}", message);
        }
    }
}

fn render_table(outcome: &QueryOutcome) -> String {
    let mut builder = Builder::default();
    builder.push_record(outcome.selected_columns.iter().cloned());
    for row in &outcome.rows {
        builder.push_record(
            outcome
                .selected_columns
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or_default()),
        );
    }

    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

fn render_json(outcome: &QueryOutcome) -> Result<String> {
    let rows: Vec<serde_json::Value> = outcome
        .rows
        .iter()
        .map(|row| {
            let obj: serde_json::Map<String, serde_json::Value> = outcome
                .selected_columns
                .iter()
                .map(|column| {
                    let value = row
                        .get(column)
                        .map(|v| serde_json::Value::String(v.clone()))
                        .unwrap_or(serde_json::Value::Null);
                    (column.clone(), value)
                })
                .collect();
            serde_json::Value::Object(obj)
        })
        .collect();

    Ok(serde_json::to_string_pretty(&rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvql_sql::ProjectedRow;

    fn outcome() -> QueryOutcome {
        let row = |year: &str, units: &str| {
            ProjectedRow::from([
                ("Year".to_string(), year.to_string()),
                ("Units".to_string(), units.to_string()),
            ])
        };
        QueryOutcome {
            selected_columns: vec!["Year".into(), "Units".into()],
            all_columns: vec!["Year".into(), "Units".into(), "Value".into()],
            rows: vec![row("2020", "Dollars"), row("2021", "Count")],
            ..Default::default()
        }
    }

    #[test]
    fn test_table_format() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let rendered = formatter.render(&outcome()).unwrap();

        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[1].contains("Year") && lines[1].contains("Units"));
        assert!(lines[1].find("Year") < lines[1].find("Units"));
        assert!(rendered.contains("2021"));
        assert!(rendered.contains("Dollars"));
    }

    #[test]
    fn test_json_format_keeps_column_order() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        let rendered = formatter.render(&outcome()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed[0]["Year"], "2020");
        assert_eq!(parsed[1]["Units"], "Count");
        assert!(rendered.find("\"Year\"") < rendered.find("\"Units\""));
    }

    #[test]
    fn test_empty_result_renders_header() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let empty = QueryOutcome {
            selected_columns: vec!["Year".into()],
            ..Default::default()
        };
        assert!(formatter.render(&empty).unwrap().contains("Year"));

        let formatter = Formatter::new(OutputFormat::Json, false);
        assert_eq!(formatter.render(&empty).unwrap(), "[]");
    }

    #[test]
    fn test_failed_outcome_is_reported() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let failed = QueryOutcome {
            errors: vec![SqlError::UnknownColumn("Region".into())],
            ..Default::default()
        };
        assert!(!formatter.print_outcome(&failed).unwrap());
        assert!(formatter.print_outcome(&outcome()).unwrap());
    }

    #[test]
    fn test_set_format() {
        let mut formatter = Formatter::new(OutputFormat::Table, true);
        formatter.set_format(OutputFormat::Json);
        assert_eq!(formatter.format(), OutputFormat::Json);
        formatter.print_warning("partial");
        formatter.print_info("info");
    }
}
