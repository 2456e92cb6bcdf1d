//! Query engine
//!
//! Ties the pipeline together for one query run: tokenize, validate, resolve
//! the file header, build the condition chain, then hand a search job to a
//! fresh scheduler and gather its result under the run's deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use csvql_core::{CsvRowSource, FileMetadata};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::columns::{ConditionColumns, SelectionColumns};
use crate::condition::ConditionChain;
use crate::config::EngineConfig;
use crate::error::SqlError;
use crate::parser::validate;
use crate::scheduler::{Scheduler, WorkerId};
use crate::search::SearchJob;
use crate::tokenizer::tokenize;
use crate::types::*;
use crate::Result;

/// Worker id of the single search job of a run
const SEARCH_WORKER: WorkerId = 1;

type Failed = Vec<SqlError>;

/// CSV query engine
///
/// Owns a header cache keyed by table alias. An entry is reused while the
/// alias keeps pointing at the same path and re-read when it does not.
pub struct QueryEngine {
    config: EngineConfig,
    files: RwLock<HashMap<String, Arc<FileMetadata>>>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a query under the configured timeout.
    pub async fn run(&self, sql: &str) -> QueryOutcome {
        self.run_with_timeout(sql, None).await
    }

    /// Run a query, overriding the configured timeout when `timeout` is set.
    ///
    /// Never fails outright: errors are reported in [`QueryOutcome::errors`]
    /// alongside zero rows.
    pub async fn run_with_timeout(&self, sql: &str, timeout: Option<Duration>) -> QueryOutcome {
        let start = Instant::now();
        let timeout = timeout.unwrap_or_else(|| self.config.query_timeout());

        let mut outcome = match self.execute(sql, timeout).await {
            Ok(outcome) => outcome,
            Err(errors) => {
                debug!(errors = errors.len(), "query failed");
                QueryOutcome::failed(errors)
            }
        };
        outcome.execution_time_ms = millis(start.elapsed());

        info!(
            rows = outcome.rows.len(),
            errors = outcome.errors.len(),
            deadline_exceeded = outcome.deadline_exceeded,
            elapsed_ms = outcome.execution_time_ms,
            "query finished"
        );
        outcome
    }

    async fn execute(&self, sql: &str, timeout: Duration) -> std::result::Result<QueryOutcome, Failed> {
        let tokens = tokenize(sql);
        let query = validate(&tokens)
            .map_err(|errors| errors.into_iter().map(SqlError::from).collect::<Vec<_>>())?;

        let metadata = self.file_metadata(&query).await.map_err(one)?;
        check_columns(&metadata, &query)?;

        let selection = SelectionColumns::from_metadata(&metadata, &query.selected_columns)
            .map_err(one)?;
        let selected_columns = selection.names().to_vec();
        let lookup = ConditionColumns::from_metadata(&metadata);
        let chain = ConditionChain::build(&query.conditions);
        debug!(
            predicates = chain.predicate_count(),
            connectors = chain.connector_count(),
            "condition chain built"
        );

        let source = CsvRowSource::open(&query.file_path)
            .map_err(SqlError::from)
            .map_err(one)?;
        let job = SearchJob::new(
            Arc::new(selection),
            Arc::new(lookup),
            Arc::new(chain),
            query.constraints.clone(),
            Box::new(source),
        );

        let mut scheduler = Scheduler::new(timeout);
        let deadline = scheduler.deadline();
        scheduler.schedule(SEARCH_WORKER).map_err(one)?;
        scheduler
            .send(SEARCH_WORKER, job.into_job(), deadline)
            .map_err(one)?;
        scheduler.start().map_err(one)?;
        let results = scheduler.results().await.map_err(one);
        scheduler.close();
        let results = results?;

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        let mut deadline_exceeded = false;
        for result in results {
            deadline_exceeded |= result.deadline_exceeded;
            if result.errors.is_empty() {
                rows.extend(result.payload);
            } else {
                errors.extend(result.errors);
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        if deadline_exceeded {
            warn!(
                timeout_ms = millis(timeout),
                rows = rows.len(),
                "query deadline exceeded, returning partial results"
            );
        }

        if let Some(max_rows) = self.config.max_rows {
            rows.truncate(max_rows);
        }

        Ok(QueryOutcome {
            selected_columns,
            all_columns: metadata.column_names(),
            rows,
            errors: Vec::new(),
            deadline_exceeded,
            execution_time_ms: 0,
        })
    }

    /// Cached header metadata for the query's alias, re-read when missing
    /// or recorded for a different path.
    async fn file_metadata(&self, query: &QueryMetadata) -> Result<Arc<FileMetadata>> {
        {
            let files = self.files.read().await;
            if let Some(cached) = files.get(&query.alias) {
                if cached.original_path == query.file_path {
                    debug!(alias = %query.alias, "file metadata cache hit");
                    return Ok(cached.clone());
                }
            }
        }

        let metadata = Arc::new(FileMetadata::read(&query.file_path)?);
        debug!(
            alias = %query.alias,
            path = %query.file_path.display(),
            columns = metadata.len(),
            "file metadata loaded"
        );

        self.files
            .write()
            .await
            .insert(query.alias.clone(), metadata.clone());
        Ok(metadata)
    }

    /// Drop the cached metadata for `alias`.
    pub async fn invalidate(&self, alias: &str) -> bool {
        self.files.write().await.remove(alias).is_some()
    }

    pub async fn clear_cache(&self) {
        self.files.write().await.clear();
    }

    /// Cached aliases, sorted.
    pub async fn cached_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.files.read().await.keys().cloned().collect();
        aliases.sort();
        aliases
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn one(error: SqlError) -> Failed {
    vec![error]
}

/// Selected and ORDER BY columns must exist in the header.
fn check_columns(metadata: &FileMetadata, query: &QueryMetadata) -> std::result::Result<(), Failed> {
    let selected = query
        .selected_columns
        .iter()
        .filter_map(SelectableColumn::column);
    let ordered = query
        .constraints
        .order_by
        .iter()
        .flat_map(|o| o.columns.iter().map(|c| c.column.as_str()));

    let errors: Vec<SqlError> = selected
        .chain(ordered)
        .filter(|name| metadata.position(name).is_none())
        .map(|name| SqlError::UnknownColumn(name.to_string()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    fn setup() -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "t.csv", "Year,Units,Value\n2019,a,1\n2020,b,2\n2021,a,3\n");
        (dir, path)
    }

    #[tokio::test]
    async fn test_run_select() {
        let (_dir, path) = setup();
        let engine = QueryEngine::default();

        let outcome = engine
            .run(&format!("SELECT 'e.Value', 'e.Year' FROM path:{path} AS e WHERE 'e.Units' = 'a'"))
            .await;

        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        assert_eq!(outcome.selected_columns, vec!["Value", "Year"]);
        assert_eq!(outcome.all_columns, vec!["Year", "Units", "Value"]);
        assert_eq!(outcome.row_count(), 2);
        assert_eq!(outcome.rows[1]["Year"], "2021");
        assert!(!outcome.deadline_exceeded);
    }

    #[tokio::test]
    async fn test_grammar_errors_are_reported_together() {
        let (_dir, path) = setup();
        let engine = QueryEngine::default();

        let outcome = engine
            .run(&format!("SELEKT 'z.Year' FROM path:{path} AS e"))
            .await;

        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().all(SqlError::is_grammar));
        assert!(engine.cached_aliases().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_selected_and_ordered_columns() {
        let (_dir, path) = setup();
        let engine = QueryEngine::default();

        let outcome = engine
            .run(&format!(
                "SELECT 'e.Region' FROM path:{path} AS e ORDER BY 'e.Month'"
            ))
            .await;

        let names: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "Column not found in file header: Region",
                "Column not found in file header: Month"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_condition_column_fails_the_job() {
        let (_dir, path) = setup();
        let engine = QueryEngine::default();

        let outcome = engine
            .run(&format!("SELECT * FROM path:{path} AS e WHERE 'e.Region' = 'x'"))
            .await;

        assert!(outcome.rows.is_empty());
        assert!(matches!(outcome.errors[..], [SqlError::Job { id: SEARCH_WORKER, .. }]));
    }

    #[tokio::test]
    async fn test_max_rows_caps_output() {
        let (_dir, path) = setup();
        let engine = QueryEngine::new(EngineConfig::default().with_max_rows(2));

        let outcome = engine.run(&format!("SELECT * FROM path:{path} AS e")).await;
        assert_eq!(outcome.row_count(), 2);
    }

    #[tokio::test]
    async fn test_metadata_cache() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_csv(dir.path(), "first.csv", "Year\n2020\n");
        let second = write_csv(dir.path(), "second.csv", "Month,Year\n1,2020\n");
        let engine = QueryEngine::default();

        let outcome = engine.run(&format!("SELECT * FROM path:{first} AS e")).await;
        assert_eq!(outcome.all_columns, vec!["Year"]);
        assert_eq!(engine.cached_aliases().await, vec!["e"]);

        // Same alias, different path: entry is replaced
        let outcome = engine.run(&format!("SELECT * FROM path:{second} AS e")).await;
        assert_eq!(outcome.all_columns, vec!["Month", "Year"]);
        assert_eq!(engine.cached_aliases().await, vec!["e"]);

        engine.run(&format!("SELECT * FROM path:{first} AS f")).await;
        assert_eq!(engine.cached_aliases().await, vec!["e", "f"]);

        assert!(engine.invalidate("f").await);
        assert!(!engine.invalidate("f").await);
        engine.clear_cache().await;
        assert!(engine.cached_aliases().await.is_empty());
    }

    #[tokio::test]
    async fn test_cached_header_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "t.csv", "Year\n2020\n");
        let engine = QueryEngine::default();

        engine.run(&format!("SELECT * FROM path:{path} AS e")).await;
        std::fs::write(&path, "Renamed\n2020\n").unwrap();

        let outcome = engine.run(&format!("SELECT * FROM path:{path} AS e")).await;
        assert_eq!(outcome.all_columns, vec!["Year"]);

        engine.invalidate("e").await;
        let outcome = engine.run(&format!("SELECT * FROM path:{path} AS e")).await;
        assert_eq!(outcome.all_columns, vec!["Renamed"]);
    }

    #[tokio::test]
    async fn test_execution_time_is_recorded_on_failure() {
        let engine = QueryEngine::default();
        let outcome = engine.run("").await;
        assert!(outcome.has_errors());
        assert!(outcome.execution_time_ms < 60_000);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
