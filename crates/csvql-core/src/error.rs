//! Error Types for csvql row sources
//!
//! Everything that can go wrong between a query and the bytes of the file it
//! names ends up here.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - Opening the file (missing file, permissions)
//! - Reading from an already opened file
//!
//! ### CSV Errors
//! - Malformed records (bad quoting, invalid UTF-8)
//!
//! ### Shape Errors
//! - `EmptyFile`: the file has no header row, so there is nothing to query
//!
//! ## Usage
//! Row sources return `Result<T>`, aliased to `Result<T, Error>`, so callers
//! can propagate with `?`.
//!
//! ```ignore
//! use csvql_core::{CsvRowSource, Result, RowSource};
//!
//! fn count_rows(path: &str) -> Result<usize> {
//!     let mut source = CsvRowSource::open(path)?;
//!     let mut count = 0;
//!     while source.next_row()?.is_some() {
//!         count += 1;
//!     }
//!     Ok(count)
//! }
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File {0} has no header row")]
    EmptyFile(String),
}

pub type Result<T> = std::result::Result<T, Error>;
