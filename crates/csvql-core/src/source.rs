//! Row Sources
//!
//! A row source is the only way the query engine touches data. It hands out
//! the header row once and then one data row at a time, so a scan never holds
//! more than a single row of the file in memory.
//!
//! ## Contract
//!
//! - `header()` returns the column names in file order. It may be called at
//!   any point; it never consumes a data row.
//! - `next_row()` returns `Ok(Some(fields))` for each data row, `Ok(None)` once
//!   the data is exhausted, and `Err` when the underlying read fails. The
//!   header row is never returned as data.
//!
//! ## Implementations
//!
//! - [`CsvRowSource`]: a CSV file (or any reader) parsed with the `csv` crate.
//!   Rows may be shorter or longer than the header (`flexible`), header cells
//!   are trimmed, data cells are passed through untouched.
//! - [`MemoryRowSource`]: rows that already live in memory.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::error::{Error, Result};

/// Sequence-producing source of raw field arrays.
pub trait RowSource: Send {
    /// The header row, in file order.
    fn header(&mut self) -> Result<Vec<String>>;

    /// The next data row, or `None` at end of data.
    fn next_row(&mut self) -> Result<Option<Vec<String>>>;
}

/// Row source backed by a CSV reader.
pub struct CsvRowSource {
    name: PathBuf,
    reader: csv::Reader<Box<dyn Read + Send>>,
    record: StringRecord,
}

impl CsvRowSource {
    /// Open a CSV file for streaming.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "opened csv row source");
        Ok(Self::from_reader(path, file))
    }

    /// Wrap an arbitrary reader. `name` is only used in error messages.
    pub fn from_reader<P, R>(name: P, reader: R) -> Self
    where
        P: AsRef<Path>,
        R: Read + Send + 'static,
    {
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(Box::new(reader) as Box<dyn Read + Send>);

        Self {
            name: name.as_ref().to_path_buf(),
            reader,
            record: StringRecord::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.name
    }
}

impl RowSource for CsvRowSource {
    fn header(&mut self) -> Result<Vec<String>> {
        let headers = self.reader.headers()?;
        if headers.is_empty() {
            return Err(Error::EmptyFile(self.name.display().to_string()));
        }
        Ok(headers.iter().map(str::to_string).collect())
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        if self.reader.read_record(&mut self.record)? {
            Ok(Some(self.record.iter().map(str::to_string).collect()))
        } else {
            Ok(None)
        }
    }
}

/// Row source over rows that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    header: Vec<String>,
    rows: VecDeque<Vec<String>>,
}

impl MemoryRowSource {
    pub fn new<H, R>(header: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = Vec<String>>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().collect(),
        }
    }

    /// Number of data rows not yet handed out.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for MemoryRowSource {
    fn header(&mut self) -> Result<Vec<String>> {
        if self.header.is_empty() {
            return Err(Error::EmptyFile("<memory>".to_string()));
        }
        Ok(self.header.clone())
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.rows.pop_front())
    }
}
