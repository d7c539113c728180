//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Run tracking and resumption support
//! - The credential store (account lifecycle persistence)
//! - The crawl-unit completion log
//! - The idempotent result sink

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ResultSink, Storage, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// Represents a crawl run in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A normalized crawled item, immutable once produced
///
/// Identity is the `id` field; the sink ignores appends for an id it has
/// already stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub id: String,
    pub username: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub keyword: String,
    pub scraped_at: DateTime<Utc>,
}
