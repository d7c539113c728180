//! Driftnet: a keyword crawl orchestrator
//!
//! This crate drives a keyword × date-window crawl against an authenticated
//! search provider, spreading request load across a pool of accounts and
//! streaming deduplicated results into SQLite with per-unit resumability.

pub mod accounts;
pub mod config;
pub mod crawler;
pub mod output;
pub mod provider;
pub mod storage;

use thiserror::Error;

/// Main error type for driftnet operations
#[derive(Debug, Error)]
pub enum DriftnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    InvalidRange(#[from] crawler::InvalidRangeError),

    #[error("Account pool error: {0}")]
    Pool(#[from] accounts::PoolError),

    #[error("Search provider error: {0}")]
    Provider(#[from] provider::ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse accounts file: {0}")]
    Accounts(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for driftnet operations
pub type Result<T> = std::result::Result<T, DriftnetError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use accounts::{AccountPool, AccountState, Credentials};
pub use config::Config;
pub use crawler::{plan, CrawlJob, CrawlProgress, CrawlUnit, DateChunk, UnitOutcome};
pub use storage::ResultRecord;
