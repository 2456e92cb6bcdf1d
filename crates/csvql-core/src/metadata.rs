//! File Metadata
//!
//! The header row of a CSV file, resolved to `(position, name)` pairs. It is
//! read once per file and then shared by every lookup a query needs.
//!
//! ## Example
//! ```ignore
//! let metadata = FileMetadata::read("data/survey.csv")?;
//! assert_eq!(metadata.position("Year"), Some(0));
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::{CsvRowSource, RowSource};

/// A single header column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataColumn {
    /// Zero-based field position in every row
    pub position: usize,

    /// Header text
    pub name: String,
}

/// Header metadata for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub columns: Vec<MetadataColumn>,
    pub original_path: PathBuf,
}

impl FileMetadata {
    /// Read the header row of the CSV file at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut source = CsvRowSource::open(path)?;
        let header = source.header()?;
        Ok(Self::from_header(path, header))
    }

    pub fn from_header<P: AsRef<Path>>(path: P, header: Vec<String>) -> Self {
        let columns = header
            .into_iter()
            .enumerate()
            .map(|(position, name)| MetadataColumn { position, name })
            .collect();

        Self {
            columns,
            original_path: path.as_ref().to_path_buf(),
        }
    }

    /// Column names in header order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of the first column called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.position)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
