//! Catalog Configuration Module
//!
//! Cache freshness, retry, persistence and tag source settings. Values are
//! loaded from `PRINTS_*` environment variables with defaults matching the
//! hosted client.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Key under which the query cache snapshot is stored durably.
pub const QUERY_CACHE_KEY: &str = "FACTORIO_PRINTS_QUERY_CACHE";

// ============================================================================
// CATALOG CONFIGURATION
// ============================================================================

/// Configuration for the query cache, mutations and persistence bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintsConfig {
    // ========================================================================
    // Query cache
    // ========================================================================
    /// An entry older than this is stale and refetched on next read.
    pub stale_time: Duration,

    /// Extra attempts for a failed read.
    pub query_retries: u32,

    /// Extra attempts for a failed remote write.
    pub mutation_retries: u32,

    /// Summaries per page of the recency-ordered list.
    pub page_size: usize,

    /// Period of the background high-watermark sync.
    pub watermark_interval: Duration,

    // ========================================================================
    // Persistence
    // ========================================================================
    /// Quiet period before a snapshot is written.
    pub persist_wait: Duration,

    /// Upper bound between a first change and the write that covers it.
    pub persist_max_wait: Duration,

    /// Per-operation timeout for the background worker.
    pub worker_timeout: Duration,

    /// Snapshot version tag. A stored snapshot with a different tag is discarded.
    pub buster: String,

    /// Snapshots older than this are discarded on restore. `None` keeps
    /// snapshots of any age.
    pub max_age: Option<Duration>,

    /// Directory of the durable store.
    pub durable_path: PathBuf,

    /// Map size of the durable store in megabytes.
    pub durable_map_size_mb: usize,

    /// Key of the snapshot in the durable store.
    pub cache_key: String,

    // ========================================================================
    // Tags
    // ========================================================================
    /// HTTP endpoint serving the tag hierarchy as JSON, if any.
    pub tags_endpoint: Option<String>,
}

impl Default for PrintsConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60 * 60),
            query_retries: 1,
            mutation_retries: 1,
            page_size: 60,
            watermark_interval: Duration::from_secs(5 * 60),
            persist_wait: Duration::from_millis(2_000),
            persist_max_wait: Duration::from_millis(10_000),
            worker_timeout: Duration::from_secs(10),
            buster: "7".to_string(),
            max_age: None,
            durable_path: PathBuf::from("./data/query-cache"),
            durable_map_size_mb: 64,
            cache_key: QUERY_CACHE_KEY.to_string(),
            tags_endpoint: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl PrintsConfig {
    /// Create PrintsConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PRINTS_STALE_TIME_SECS`: Freshness window (default: 3600)
    /// - `PRINTS_QUERY_RETRIES`: Read retries (default: 1)
    /// - `PRINTS_MUTATION_RETRIES`: Write retries (default: 1)
    /// - `PRINTS_PAGE_SIZE`: Recency page size (default: 60)
    /// - `PRINTS_WATERMARK_INTERVAL_SECS`: Watermark sync period (default: 300)
    /// - `PRINTS_PERSIST_WAIT_MS`: Debounce wait (default: 2000)
    /// - `PRINTS_PERSIST_MAX_WAIT_MS`: Debounce max wait (default: 10000)
    /// - `PRINTS_WORKER_TIMEOUT_MS`: Worker op timeout (default: 10000)
    /// - `PRINTS_CACHE_BUSTER`: Snapshot version tag (default: "7")
    /// - `PRINTS_CACHE_MAX_AGE_SECS`: Snapshot max age (default: unlimited)
    /// - `PRINTS_DURABLE_PATH`: Durable store directory (default: ./data/query-cache)
    /// - `PRINTS_DURABLE_MAP_SIZE_MB`: Durable map size (default: 64)
    /// - `PRINTS_TAGS_ENDPOINT`: Tag hierarchy URL (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            stale_time: env_parse("PRINTS_STALE_TIME_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_time),
            query_retries: env_parse("PRINTS_QUERY_RETRIES").unwrap_or(defaults.query_retries),
            mutation_retries: env_parse("PRINTS_MUTATION_RETRIES")
                .unwrap_or(defaults.mutation_retries),
            page_size: env_parse("PRINTS_PAGE_SIZE").unwrap_or(defaults.page_size),
            watermark_interval: env_parse("PRINTS_WATERMARK_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.watermark_interval),
            persist_wait: env_parse("PRINTS_PERSIST_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.persist_wait),
            persist_max_wait: env_parse("PRINTS_PERSIST_MAX_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.persist_max_wait),
            worker_timeout: env_parse("PRINTS_WORKER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.worker_timeout),
            buster: std::env::var("PRINTS_CACHE_BUSTER").unwrap_or(defaults.buster),
            max_age: env_parse("PRINTS_CACHE_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .or(defaults.max_age),
            durable_path: std::env::var("PRINTS_DURABLE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.durable_path),
            durable_map_size_mb: env_parse("PRINTS_DURABLE_MAP_SIZE_MB")
                .unwrap_or(defaults.durable_map_size_mb),
            cache_key: defaults.cache_key,
            tags_endpoint: std::env::var("PRINTS_TAGS_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    /// Reject settings the cache and persister cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(invalid("page_size", "0", "must be at least 1"));
        }
        if self.watermark_interval.is_zero() {
            return Err(invalid("watermark_interval", "0", "must be positive"));
        }
        if self.persist_max_wait < self.persist_wait {
            return Err(invalid(
                "persist_max_wait",
                &format!("{:?}", self.persist_max_wait),
                "must not be shorter than persist_wait",
            ));
        }
        if self.worker_timeout.is_zero() {
            return Err(invalid("worker_timeout", "0", "must be positive"));
        }
        if self.buster.is_empty() {
            return Err(invalid("buster", "", "must not be empty"));
        }
        if self.durable_map_size_mb == 0 {
            return Err(invalid("durable_map_size_mb", "0", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
