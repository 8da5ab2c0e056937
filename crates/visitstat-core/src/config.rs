use std::time::Duration;

use crate::scope::TenantScope;

/// Settings the storage backend is constructed with. The backend never reads
/// the environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// DuckDB size string such as `"1GB"` or `"512MB"`.
    pub memory_limit: String,
    /// How long an operation waits for the connection before failing with
    /// `StoreError::Timeout`.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_limit: "1GB".to_string(),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub lock_timeout_ms: u64,
    pub rollup_interval_secs: u64,
    /// Scope the rollup runs under. `VISITSTAT_TENANT` unset means global.
    pub scope: TenantScope,
    pub purge_after_rollup: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        Ok(Self {
            data_dir: lookup("VISITSTAT_DATA_DIR").unwrap_or_else(|| "./data".to_string()),
            duckdb_memory_limit: lookup("VISITSTAT_DUCKDB_MEMORY")
                .unwrap_or_else(|| "1GB".to_string()),
            lock_timeout_ms: lookup("VISITSTAT_LOCK_TIMEOUT_MS")
                .unwrap_or_else(|| "5000".to_string())
                .parse()
                .map_err(|e| format!("invalid lock timeout: {e}"))?,
            rollup_interval_secs: lookup("VISITSTAT_ROLLUP_INTERVAL_SECS")
                .unwrap_or_else(|| "3600".to_string())
                .parse()
                .map_err(|e| format!("invalid rollup interval: {e}"))?,
            scope: match lookup("VISITSTAT_TENANT") {
                Some(raw) if !raw.trim().is_empty() => TenantScope::Tenant(
                    raw.trim()
                        .parse()
                        .map_err(|e| format!("invalid tenant id: {e}"))?,
                ),
                _ => TenantScope::Global,
            },
            purge_after_rollup: lookup("VISITSTAT_PURGE_AFTER_ROLLUP")
                .map(|v| v != "false")
                .unwrap_or(true),
        })
    }

    pub fn db_path(&self) -> String {
        format!("{}/visitstat.db", self.data_dir)
    }

    pub fn rollup_interval(&self) -> Duration {
        Duration::from_secs(self.rollup_interval_secs)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            memory_limit: self.duckdb_memory_limit.clone(),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }
}
