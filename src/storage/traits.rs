//! Storage traits and error types
//!
//! This module defines the trait interfaces for the persistence layer:
//! `Storage` for run tracking, the credential store and the unit completion
//! log, and `ResultSink` for idempotent result appends.

use crate::accounts::Account;
use crate::crawler::{CrawlUnit, UnitOutcome};
use crate::storage::{ResultRecord, RunRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid value in column {column}: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the persistence backend
///
/// Implementations must be safe to use behind a mutex from multiple
/// workers; every method is a single short transaction.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Credential Store =====

    /// Inserts or updates an account, including its lifecycle state.
    /// Called on every state transition.
    fn upsert_account(&mut self, account: &Account) -> StorageResult<()>;

    /// Gets a persisted account by username
    fn get_account(&self, username: &str) -> StorageResult<Option<Account>>;

    /// Lists all persisted accounts
    fn list_accounts(&self) -> StorageResult<Vec<Account>>;

    /// Counts accounts currently in the given state
    fn count_accounts_by_state(&self, state: crate::accounts::AccountState)
        -> StorageResult<u64>;

    // ===== Unit Completion Log =====

    /// Records the outcome of a crawl unit, replacing any earlier outcome
    /// for the same (keyword, window) and bumping the attempt counter
    fn record_unit_outcome(
        &mut self,
        unit: &CrawlUnit,
        outcome: UnitOutcome,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Loads all recorded unit outcomes keyed by `CrawlUnit::key()`
    fn load_unit_outcomes(&self) -> StorageResult<HashMap<String, UnitOutcome>>;

    /// Counts units whose latest outcome matches
    fn count_units_by_outcome(&self, outcome: UnitOutcome) -> StorageResult<u64>;

    /// Deletes the completion log (for `--fresh` runs). Results are kept;
    /// the idempotent sink absorbs re-crawled records.
    fn clear_unit_log(&mut self) -> StorageResult<()>;

    // ===== Result Queries =====

    /// Counts all accepted results
    fn count_results(&self) -> StorageResult<u64>;

    /// Counts accepted results grouped by keyword, descending
    fn count_results_by_keyword(&self) -> StorageResult<Vec<(String, u64)>>;
}

/// Append-only, idempotent result store
pub trait ResultSink {
    /// Appends a record keyed by its identifier. Returns true if the row
    /// was newly inserted, false if a record with the same id already
    /// existed (the append is a no-op in that case).
    fn append(&mut self, record: &ResultRecord) -> StorageResult<bool>;
}
