use std::str::FromStr;

use anyhow::{bail, ensure, Result};

/// Application configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// Store connection settings
    pub database: DatabaseConfig,
    /// Serving worker count; 0 means "one per CPU core"
    pub cluster_workers: usize,
    /// Ingestion pipeline tuning
    pub etl: EtlConfig,
    /// Search tuning
    pub search: SearchConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    /// Use TLS; certificate verification is relaxed when enabled
    pub ssl: bool,
    /// Serving-plane pool bounds
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Debug, Clone)]
pub struct EtlConfig {
    /// Batch writer flush threshold, in records
    pub batch_size: usize,
    /// Retry attempts for transient connection failures
    pub retry_attempts: u32,
    /// Base backoff delay in ms (doubles per attempt)
    pub retry_delay_ms: u64,
    /// Pacing sleep after each successful flush
    pub flush_delay_ms: u64,
    /// Idle-socket timeout for the ingestion pool
    pub pool_idle_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Upper bound on the candidate set used for pagination counts
    pub max_candidates: i64,
    /// Term length at or below which matching degrades to prefix-only
    pub short_query_max_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database: DatabaseConfig::default(),
            cluster_workers: 0,
            etl: EtlConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ssl: false,
            pool_min: 2,
            pool_max: 10,
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            batch_size: 5_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            flush_delay_ms: 200,
            pool_idle_timeout_ms: 240_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5_000,
            short_query_max_length: 3,
        }
    }
}

impl Config {
    /// Read configuration from the environment. Parse failures are fatal;
    /// call [`Config::validate`] afterwards for range and presence checks.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_parse("ABR_SEARCH_PORT")? {
            config.port = port;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(ssl) = env_bool("DATABASE_SSL")? {
            config.database.ssl = ssl;
        }
        if let Some(min) = env_parse("DATABASE_POOL_MIN")? {
            config.database.pool_min = min;
        }
        if let Some(max) = env_parse("DATABASE_POOL_MAX")? {
            config.database.pool_max = max;
        }
        if let Some(workers) = env_parse("CLUSTER_WORKERS")? {
            config.cluster_workers = workers;
        }
        if let Some(size) = env_parse("ETL_BATCH_SIZE")? {
            config.etl.batch_size = size;
        }
        if let Some(attempts) = env_parse("ETL_RETRY_ATTEMPTS")? {
            config.etl.retry_attempts = attempts;
        }
        if let Some(delay) = env_parse("ETL_RETRY_DELAY_MS")? {
            config.etl.retry_delay_ms = delay;
        }
        if let Some(delay) = env_parse("ETL_FLUSH_DELAY_MS")? {
            config.etl.flush_delay_ms = delay;
        }
        if let Some(timeout) = env_parse("ETL_POOL_IDLE_TIMEOUT_MS")? {
            config.etl.pool_idle_timeout_ms = timeout;
        }
        if let Some(cap) = env_parse("SEARCH_MAX_CANDIDATES")? {
            config.search.max_candidates = cap;
        }
        if let Some(len) = env_parse("SEARCH_SHORT_QUERY_MAX_LENGTH")? {
            config.search.short_query_max_length = len;
        }

        Ok(config)
    }

    /// Range and presence checks. The binaries run this at startup and exit
    /// non-zero with the diagnostic on failure.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.database.url.trim().is_empty(),
            "DATABASE_URL must be set"
        );
        ensure!(
            self.database.pool_max >= 1,
            "DATABASE_POOL_MAX must be at least 1, got {}",
            self.database.pool_max
        );
        ensure!(
            self.database.pool_min <= self.database.pool_max,
            "DATABASE_POOL_MIN ({}) must not exceed DATABASE_POOL_MAX ({})",
            self.database.pool_min,
            self.database.pool_max
        );
        ensure!(
            self.etl.batch_size >= 1,
            "ETL_BATCH_SIZE must be at least 1"
        );
        ensure!(
            (100..=50_000).contains(&self.search.max_candidates),
            "SEARCH_MAX_CANDIDATES must be between 100 and 50000, got {}",
            self.search.max_candidates
        );
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("invalid value for {key}: {raw:?}"),
        },
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" | "" => Ok(Some(false)),
            _ => bail!("invalid value for {key}: {raw:?} (expected true/false)"),
        },
        Err(_) => Ok(None),
    }
}
