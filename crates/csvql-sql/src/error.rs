//! Query error types

use thiserror::Error;

use crate::scheduler::WorkerId;

/// Grammar and semantic validation errors
///
/// The validator collects every one of these it can find in a single pass;
/// `UnexpectedEnd` is the structural error that stops it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("Expected SELECT, got '{0}'")]
    InvalidSelect(String),

    #[error("Invalid selectable column: {0}")]
    InvalidSelectableColumn(String),

    #[error("Duplicate selectable column: {0}")]
    DuplicateColumn(String),

    #[error("Expected FROM, got '{0}'")]
    InvalidFrom(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Expected AS, got '{0}'")]
    InvalidAs(String),

    #[error("Invalid alias: '{0}'")]
    InvalidAlias(String),

    #[error("Expected alias '{expected}', got '{found}' in '{reference}'")]
    AliasMismatch {
        expected: String,
        found: String,
        reference: String,
    },

    #[error("Invalid WHERE clause: {0}")]
    InvalidWhere(String),

    #[error("Invalid condition column: {0}")]
    InvalidConditionColumn(String),

    #[error("Invalid comparison operator '{0}', expected one of =, !=, <, <=, >, >=")]
    InvalidComparisonOperator(String),

    #[error("Invalid logical operator '{0}', expected AND or OR")]
    InvalidLogicalOperator(String),

    #[error("Condition values must be enclosed in single quotes, got {0}")]
    InvalidValueQuoting(String),

    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    #[error("Invalid ORDER BY: {0}")]
    InvalidOrderBy(String),

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("Unexpected end of query: {0}")]
    UnexpectedEnd(String),
}

/// Errors raised while evaluating a condition against a row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Invalid column to compare. Column {0} not found")]
    UnknownColumn(String),

    #[error("Cannot convert '{value}' to {data_type} in column {column}")]
    TypeCoercion {
        column: String,
        value: String,
        data_type: String,
    },

    #[error("Row has {row_len} fields, column {column} is at position {position}")]
    MissingField {
        column: String,
        position: usize,
        row_len: usize,
    },
}

/// Query execution errors
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    #[error("Evaluation error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Source error: {0}")]
    Source(#[from] csvql_core::Error),

    #[error("Column not found in file header: {0}")]
    UnknownColumn(String),

    #[error("Worker with id {0} already scheduled")]
    DuplicateWorker(WorkerId),

    #[error("Worker with id {0} is not scheduled")]
    UnknownWorker(WorkerId),

    #[error("Worker with id {0} already has a job")]
    JobAlreadySent(WorkerId),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Column not found for position {0}")]
    MissingProjection(usize),

    #[error("Job {0} panicked")]
    JobPanicked(WorkerId),

    #[error("Job {id} failed: {source}")]
    Job {
        id: WorkerId,
        #[source]
        source: Box<SqlError>,
    },
}

impl SqlError {
    pub(crate) fn in_job(self, id: WorkerId) -> Self {
        SqlError::Job {
            id,
            source: Box::new(self),
        }
    }

    /// True for errors that come from the query text itself.
    pub fn is_grammar(&self) -> bool {
        matches!(self, SqlError::Grammar(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_mismatch_message() {
        let err = GrammarError::AliasMismatch {
            expected: "e".into(),
            found: "z".into(),
            reference: "z.Year".into(),
        };
        assert_eq!(err.to_string(), "Expected alias 'e', got 'z' in 'z.Year'");
    }

    #[test]
    fn test_job_error_wraps_source() {
        let err = SqlError::from(ResolveError::UnknownColumn("Year".into())).in_job(3);
        assert_eq!(
            err.to_string(),
            "Job 3 failed: Evaluation error: Invalid column to compare. Column Year not found"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_grammar_conversion() {
        let err: SqlError = GrammarError::InvalidFrom("FORM".into()).into();
        assert!(err.is_grammar());
    }
}
