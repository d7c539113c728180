use chrono::NaiveDate;
use serde::Deserialize;

/// Main configuration structure for driftnet
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub job: JobConfig,
    pub pool: PoolConfig,
    pub provider: ProviderConfig,
    pub output: OutputConfig,
}

/// Crawl job configuration: what to search for and how fast
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Keywords to crawl, in priority order
    pub keywords: Vec<String>,

    /// First day of the crawl range (inclusive)
    #[serde(rename = "start-date")]
    pub start_date: NaiveDate,

    /// Last day of the crawl range (exclusive)
    #[serde(rename = "end-date")]
    pub end_date: NaiveDate,

    /// Width of each date window in days
    #[serde(rename = "chunk-days", default = "default_chunk_days")]
    pub chunk_days: u32,

    /// Maximum accepted records per (keyword, window) unit
    #[serde(rename = "max-per-chunk", default = "default_max_per_chunk")]
    pub max_per_chunk: u32,

    /// Delay between consecutive items within a unit (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Delay between consecutive units on one worker (milliseconds)
    #[serde(rename = "chunk-delay-ms", default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Upper bound on concurrent workers (also bounded by account count)
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: u32,
}

/// Account pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Path to the JSON accounts file
    #[serde(rename = "accounts-path")]
    pub accounts_path: String,

    /// Consecutive authentication failures before an account is banned
    #[serde(rename = "ban-threshold", default = "default_ban_threshold")]
    pub ban_threshold: u32,

    /// Base cooldown after a transient failure (seconds); doubles per failure
    #[serde(rename = "cooldown-base-secs", default = "default_cooldown_base_secs")]
    pub cooldown_base_secs: u64,

    /// Cap on the exponential cooldown (seconds)
    #[serde(rename = "cooldown-max-secs", default = "default_cooldown_max_secs")]
    pub cooldown_max_secs: u64,

    /// Attempts to acquire an account per unit before the unit is skipped
    #[serde(rename = "acquire-attempts", default = "default_acquire_attempts")]
    pub acquire_attempts: u32,

    /// Pause between acquire attempts when the pool is exhausted (seconds)
    #[serde(rename = "acquire-backoff-secs", default = "default_acquire_backoff_secs")]
    pub acquire_backoff_secs: u64,
}

/// Search provider endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the search API
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Items requested per provider page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_chunk_days() -> u32 {
    7
}

fn default_max_per_chunk() -> u32 {
    130
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

fn default_max_workers() -> u32 {
    4
}

fn default_ban_threshold() -> u32 {
    3
}

fn default_cooldown_base_secs() -> u64 {
    60
}

fn default_cooldown_max_secs() -> u64 {
    3600
}

fn default_acquire_attempts() -> u32 {
    3
}

fn default_acquire_backoff_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    50
}
