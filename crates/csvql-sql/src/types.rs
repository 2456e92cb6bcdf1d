//! Query metadata types and result structures

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlError;

/// Column selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectableColumn {
    /// All columns (*)
    All,
    /// `'alias.column'`
    Column {
        alias: String,
        column: String,
        /// The reference as written, quotes stripped
        original: String,
    },
}

impl SelectableColumn {
    /// Column name, `None` for `*`.
    pub fn column(&self) -> Option<&str> {
        match self {
            SelectableColumn::All => None,
            SelectableColumn::Column { column, .. } => Some(column),
        }
    }
}

/// Declared type of a condition column (`'e.Year'::int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    String,
}

impl DataType {
    pub const NAMES: [&'static str; 3] = ["int", "float", "string"];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
        }
    }
}

impl FromStr for DataType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "string" => Ok(DataType::String),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a single predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOperator {
    pub const SYMBOLS: [&'static str; 6] = ["=", "!=", "<", "<=", ">", ">="];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::LtEq => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::GtEq => ">=",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(ComparisonOperator::Eq),
            "!=" => Ok(ComparisonOperator::NotEq),
            "<" => Ok(ComparisonOperator::Lt),
            "<=" => Ok(ComparisonOperator::LtEq),
            ">" => Ok(ComparisonOperator::Gt),
            ">=" => Ok(ComparisonOperator::GtEq),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical operator joining two conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    /// Case-insensitive match of `AND` / `OR`.
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("and") {
            Some(LogicalOperator::And)
        } else if token.eq_ignore_ascii_case("or") {
            Some(LogicalOperator::Or)
        } else {
            None
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => f.write_str("AND"),
            LogicalOperator::Or => f.write_str("OR"),
        }
    }
}

/// One WHERE condition as extracted by the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionDescriptor {
    pub alias: String,
    pub column: String,
    pub data_type: Option<DataType>,
    pub operator: ComparisonOperator,
    /// Literal with the enclosing quotes stripped
    pub value: String,
    /// Operator joining this condition to the next one
    pub logical_operator: Option<LogicalOperator>,
}

/// `'alias.column'` reference outside the SELECT list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub columns: Vec<ColumnRef>,
    pub direction: SortDirection,
}

/// OFFSET / LIMIT / ORDER BY
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<OrderBy>,
}

/// Everything the validator extracts from a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetadata {
    pub selected_columns: Vec<SelectableColumn>,
    pub file_path: PathBuf,
    pub alias: String,
    pub conditions: Vec<ConditionDescriptor>,
    pub constraints: Constraints,
}

impl QueryMetadata {
    pub fn selects_all(&self) -> bool {
        matches!(self.selected_columns.as_slice(), [SelectableColumn::All])
    }
}

/// Query result row: original column name to field value
pub type ProjectedRow = HashMap<String, String>;

/// Complete query response
#[derive(Debug, Default)]
pub struct QueryOutcome {
    /// Selected column names in query order (header order for `*`)
    pub selected_columns: Vec<String>,
    /// Every column of the file's header
    pub all_columns: Vec<String>,
    /// Result rows
    pub rows: Vec<ProjectedRow>,
    /// Errors; non-empty means the query failed and `rows` is empty
    pub errors: Vec<SqlError>,
    /// The deadline cut the scan short; `rows` is partial
    pub deadline_exceeded: bool,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryOutcome {
    pub(crate) fn failed(errors: Vec<SqlError>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
