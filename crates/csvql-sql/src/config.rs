//! Engine configuration
//!
//! Defaults can be overridden from the environment:
//!
//! - `CSVQL_QUERY_TIMEOUT_MS`: deadline shared by all jobs of one query run
//! - `CSVQL_MAX_ROWS`: hard cap on returned rows

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default query deadline: one minute.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 60_000;

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

/// Query engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for one query run, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Maximum number of rows returned, applied after OFFSET and LIMIT.
    /// `None` means unlimited.
    #[serde(default)]
    pub max_rows: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            max_rows: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `CSVQL_*` environment variables. Absent or
    /// unparsable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let query_timeout_ms = lookup("CSVQL_QUERY_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(defaults.query_timeout_ms);

        let max_rows = lookup("CSVQL_MAX_ROWS")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .or(defaults.max_rows);

        Self {
            query_timeout_ms,
            max_rows,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.query_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_rows, None);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CSVQL_QUERY_TIMEOUT_MS", "250"),
            ("CSVQL_MAX_ROWS", " 10 "),
        ]));
        assert_eq!(config.query_timeout_ms, 250);
        assert_eq!(config.max_rows, Some(10));
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CSVQL_QUERY_TIMEOUT_MS", "soon"),
            ("CSVQL_MAX_ROWS", "-3"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_rows": 5}"#).unwrap();
        assert_eq!(config.query_timeout_ms, DEFAULT_QUERY_TIMEOUT_MS);
        assert_eq!(config.max_rows, Some(5));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_query_timeout(Duration::from_millis(1500))
            .with_max_rows(3);
        assert_eq!(config.query_timeout_ms, 1500);
        assert_eq!(config.max_rows, Some(3));
    }
}
