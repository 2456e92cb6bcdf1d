//! csvql query engine
//!
//! Runs SQL-like queries against a single CSV file.
//!
//! ## Query language
//!
//! ```sql
//! -- Every column
//! SELECT * FROM path:data/survey.csv AS e;
//!
//! -- Typed filters; AND binds tighter than OR
//! SELECT 'e.Year', 'e.Value' FROM path:data/survey.csv AS e
//! WHERE 'e.Year'::int > '2013' AND 'e.Units' = 'Dollars' OR 'e.Value'::float >= '1e6';
//!
//! -- Sorting and paging
//! SELECT 'e.Year' FROM path:data/survey.csv AS e
//! ORDER BY 'e.Value', 'e.Year' DESC OFFSET 10 LIMIT 5;
//! ```
//!
//! - Column references are quoted and qualified with the table alias.
//! - Condition values are always quoted; `::int`, `::float` and `::string`
//!   choose how both sides compare. Untyped comparisons are lexicographic.
//! - Operators: `=`, `!=`, `<`, `<=`, `>`, `>=`.
//! - Keywords are case-insensitive.
//!
//! ## Pipeline
//!
//! [`tokenize`] -> [`validate`] -> [`ConditionChain::build`] -> [`SearchJob`]
//! run by a [`Scheduler`] under one [`Deadline`]. [`QueryEngine`] drives the
//! whole thing and caches file headers per alias.
//!
//! ## Limitations
//!
//! - One file per query, no joins
//! - No aggregation or GROUP BY
//! - Read-only

mod columns;
mod condition;
mod config;
mod error;
mod executor;
mod parser;
mod resolver;
mod scheduler;
mod search;
mod tokenizer;
mod types;

pub use columns::{ConditionColumns, SelectionColumns};
pub use condition::{ConditionChain, ConditionNode, Predicate};
pub use config::{EngineConfig, DEFAULT_QUERY_TIMEOUT_MS};
pub use error::{GrammarError, ResolveError, SqlError};
pub use executor::QueryEngine;
pub use parser::{parse_query, validate};
pub use resolver::{compare, compare_sort_values, evaluate, resolve};
pub use scheduler::{Deadline, JobResult, Scheduler, WorkerId, WorkerState};
pub use search::SearchJob;
pub use tokenizer::{tokenize, Token};
pub use types::*;

/// Result type for query operations
pub type Result<T> = std::result::Result<T, SqlError>;
