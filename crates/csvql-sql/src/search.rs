//! Search job
//!
//! Scans one row source, keeps rows matching the condition chain and
//! projects them to the selected columns. Rows are filtered, then sorted,
//! then offset, then limited:
//!
//! - without ORDER BY the scan streams; OFFSET skips matching rows and the
//!   scan stops once LIMIT rows are collected,
//! - with ORDER BY every matching row is kept, stably sorted on the raw
//!   fields, and OFFSET/LIMIT are applied to the sorted rows.
//!
//! When the deadline fires the job stops reading and returns what it has,
//! post-processed the same way.

use std::cmp::Ordering;
use std::sync::Arc;

use csvql_core::RowSource;
use tracing::debug;

use crate::columns::{ConditionColumns, SelectionColumns};
use crate::condition::ConditionChain;
use crate::error::SqlError;
use crate::resolver::{compare_sort_values, resolve};
use crate::scheduler::{Deadline, JobResult, WorkerId};
use crate::types::{Constraints, ProjectedRow, SortDirection};
use crate::Result;

/// One unit of scanning work, owning its row source.
pub struct SearchJob {
    selection: Arc<SelectionColumns>,
    lookup: Arc<ConditionColumns>,
    chain: Arc<ConditionChain>,
    constraints: Constraints,
    source: Box<dyn RowSource>,
}

struct Scan {
    rows: Vec<ProjectedRow>,
    scanned: usize,
    deadline_exceeded: bool,
}

impl SearchJob {
    pub fn new(
        selection: Arc<SelectionColumns>,
        lookup: Arc<ConditionColumns>,
        chain: Arc<ConditionChain>,
        constraints: Constraints,
        source: Box<dyn RowSource>,
    ) -> Self {
        Self {
            selection,
            lookup,
            chain,
            constraints,
            source,
        }
    }

    /// Run to completion or until `deadline` is done.
    ///
    /// A read, evaluation or projection error aborts the job: the result
    /// carries the error and no rows.
    pub fn run(mut self, id: WorkerId, deadline: &Deadline) -> JobResult {
        let scan = if self.constraints.order_by.is_some() {
            self.scan_sorted(deadline)
        } else {
            self.scan_streaming(deadline)
        };

        match scan {
            Ok(scan) => {
                debug!(
                    worker_id = id,
                    scanned = scan.scanned,
                    rows = scan.rows.len(),
                    deadline_exceeded = scan.deadline_exceeded,
                    "search job finished"
                );
                JobResult {
                    id,
                    payload: scan.rows,
                    errors: Vec::new(),
                    deadline_exceeded: scan.deadline_exceeded,
                }
            }
            Err(e) => {
                debug!(worker_id = id, error = %e, "search job failed");
                JobResult::failed(id, e.in_job(id))
            }
        }
    }

    /// Adapt into a scheduler job.
    pub fn into_job(self) -> impl FnOnce(WorkerId, Deadline) -> JobResult + Send + 'static {
        move |id, deadline| self.run(id, &deadline)
    }

    fn scan_streaming(&mut self, deadline: &Deadline) -> Result<Scan> {
        let offset = self.constraints.offset.unwrap_or(0);
        let limit = self.constraints.limit;

        let mut scan = Scan {
            rows: Vec::new(),
            scanned: 0,
            deadline_exceeded: false,
        };
        if limit == Some(0) {
            return Ok(scan);
        }

        let mut skipped = 0;
        loop {
            if deadline.is_done() {
                scan.deadline_exceeded = true;
                break;
            }
            let Some(row) = self.source.next_row()? else {
                break;
            };
            scan.scanned += 1;

            if !resolve(&self.chain, &self.lookup, &row)? {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }

            scan.rows.push(self.project(&row)?);
            if limit.is_some_and(|limit| scan.rows.len() >= limit) {
                break;
            }
        }

        Ok(scan)
    }

    fn scan_sorted(&mut self, deadline: &Deadline) -> Result<Scan> {
        let mut matched = Vec::new();
        let mut scanned = 0;
        let mut deadline_exceeded = false;

        loop {
            if deadline.is_done() {
                deadline_exceeded = true;
                break;
            }
            let Some(row) = self.source.next_row()? else {
                break;
            };
            scanned += 1;

            if resolve(&self.chain, &self.lookup, &row)? {
                matched.push(row);
            }
        }

        self.sort(&mut matched)?;

        let offset = self.constraints.offset.unwrap_or(0);
        let limit = self.constraints.limit.unwrap_or(usize::MAX);
        let rows = matched
            .iter()
            .skip(offset)
            .take(limit)
            .map(|row| self.project(row))
            .collect::<Result<Vec<_>>>()?;

        Ok(Scan {
            rows,
            scanned,
            deadline_exceeded,
        })
    }

    fn sort(&self, rows: &mut [Vec<String>]) -> Result<()> {
        let Some(order_by) = &self.constraints.order_by else {
            return Ok(());
        };

        let keys = order_by
            .columns
            .iter()
            .map(|c| {
                self.lookup
                    .position(&c.column)
                    .ok_or_else(|| SqlError::UnknownColumn(c.column.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        rows.sort_by(|a, b| {
            let ordering = keys
                .iter()
                .map(|&position| compare_sort_values(field(a, position), field(b, position)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal);
            match order_by.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(())
    }

    /// Selected fields of `row`, keyed by column name. Fields missing from a
    /// short row project as empty strings.
    fn project(&self, row: &[String]) -> Result<ProjectedRow> {
        let mut projected = ProjectedRow::with_capacity(self.selection.len());
        for position in self.selection.positions() {
            let name = self
                .selection
                .column(position)
                .ok_or(SqlError::MissingProjection(position))?;
            let value = row.get(position).cloned().unwrap_or_default();
            projected.entry(name.to_string()).or_insert(value);
        }
        Ok(projected)
    }
}

fn field(row: &[String], position: usize) -> &str {
    row.get(position).map(String::as_str).unwrap_or("")
}
