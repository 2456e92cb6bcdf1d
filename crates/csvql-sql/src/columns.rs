//! Column resolvers
//!
//! Lookups derived from a file's header metadata: which positions a query
//! projects, and where each condition column lives in a row.

use std::collections::{HashMap, HashSet};

use csvql_core::FileMetadata;

use crate::error::SqlError;
use crate::types::SelectableColumn;
use crate::Result;

/// Selected columns keyed by row position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionColumns {
    by_position: HashMap<usize, String>,
    /// Ascending
    positions: Vec<usize>,
    names: Vec<String>,
}

impl SelectionColumns {
    /// Resolve the SELECT list against the header.
    ///
    /// `*` selects every header column; a repeated header name is selected
    /// once, at its first position, the same one condition lookups use. A
    /// named column missing from the header is an error.
    pub fn from_metadata(metadata: &FileMetadata, selected: &[SelectableColumn]) -> Result<Self> {
        let select_all = selected.iter().any(|c| matches!(c, SelectableColumn::All));

        if select_all {
            let mut seen = HashSet::with_capacity(metadata.len());
            let mut by_position = HashMap::with_capacity(metadata.len());
            let mut names = Vec::with_capacity(metadata.len());
            for column in &metadata.columns {
                if seen.insert(column.name.as_str()) {
                    by_position.insert(column.position, column.name.clone());
                    names.push(column.name.clone());
                }
            }
            return Ok(Self::new(by_position, names));
        }

        let mut by_position = HashMap::with_capacity(selected.len());
        let mut names = Vec::with_capacity(selected.len());
        for name in selected.iter().filter_map(SelectableColumn::column) {
            let position = metadata
                .position(name)
                .ok_or_else(|| SqlError::UnknownColumn(name.to_string()))?;
            by_position.insert(position, name.to_string());
            names.push(name.to_string());
        }

        Ok(Self::new(by_position, names))
    }

    fn new(by_position: HashMap<usize, String>, names: Vec<String>) -> Self {
        let mut positions: Vec<usize> = by_position.keys().copied().collect();
        positions.sort_unstable();
        Self {
            by_position,
            positions,
            names,
        }
    }

    pub fn contains_position(&self, position: usize) -> bool {
        self.by_position.contains_key(&position)
    }

    pub fn column(&self, position: usize) -> Option<&str> {
        self.by_position.get(&position).map(String::as_str)
    }

    /// Selected row positions, ascending.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }

    /// Selected names in query order (header order for `*`).
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }
}

/// Header name to row position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionColumns {
    positions: HashMap<String, usize>,
}

impl ConditionColumns {
    /// The first occurrence of a repeated header name wins.
    pub fn from_metadata(metadata: &FileMetadata) -> Self {
        let mut positions = HashMap::with_capacity(metadata.len());
        for column in &metadata.columns {
            positions
                .entry(column.name.clone())
                .or_insert(column.position);
        }
        Self { positions }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}
