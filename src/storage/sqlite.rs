//! SQLite storage implementation
//!
//! This module provides the SQLite-based implementation of the `Storage`
//! and `ResultSink` traits.

use crate::accounts::{Account, AccountState, Credentials};
use crate::crawler::{CrawlUnit, UnitOutcome};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ResultSink, Storage, StorageError, StorageResult};
use crate::storage::{ResultRecord, RunRecord, RunStatus};
use crate::DriftnetError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at the given path
    pub fn new(path: &Path) -> Result<Self, DriftnetError> {
        let conn = Connection::open(path)?;

        // WAL with synchronous=NORMAL: committed transactions survive a
        // process kill, which is what makes unit boundaries safe
        // interruption points.
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, DriftnetError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidColumn {
            column,
            value: value.to_string(),
        })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<(Account, Option<String>, Option<String>)> {
    let account = Account {
        credentials: Credentials {
            username: row.get(0)?,
            password: row.get(1)?,
            email: row.get(2)?,
            email_password: row.get(3)?,
        },
        state: AccountState::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(AccountState::Unregistered),
        consecutive_failures: row.get(5)?,
        cooldown_until: None,
        last_used_at: None,
    };
    let cooldown: Option<String> = row.get(6)?;
    let last_used: Option<String> = row.get(7)?;
    Ok((account, cooldown, last_used))
}

fn finish_account(
    (mut account, cooldown, last_used): (Account, Option<String>, Option<String>),
) -> StorageResult<Account> {
    if let Some(value) = cooldown {
        account.cooldown_until = Some(parse_timestamp("cooldown_until", &value)?);
    }
    if let Some(value) = last_used {
        account.last_used_at = Some(parse_timestamp("last_used_at", &value)?);
    }
    Ok(account)
}

const ACCOUNT_COLUMNS: &str = "username, password, email, email_password, state, \
                               consecutive_failures, cooldown_until, last_used_at";

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status
             FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .optional()?;

        Ok(run)
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2 WHERE id = ?3",
            params![now, RunStatus::Completed.to_db_string(), run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Credential Store =====

    fn upsert_account(&mut self, account: &Account) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO accounts (username, password, email, email_password, state,
                                   consecutive_failures, cooldown_until, last_used_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(username) DO UPDATE SET
                 password = excluded.password,
                 email = excluded.email,
                 email_password = excluded.email_password,
                 state = excluded.state,
                 consecutive_failures = excluded.consecutive_failures,
                 cooldown_until = excluded.cooldown_until,
                 last_used_at = excluded.last_used_at,
                 updated_at = excluded.updated_at",
            params![
                account.credentials.username,
                account.credentials.password,
                account.credentials.email,
                account.credentials.email_password,
                account.state.to_db_string(),
                account.consecutive_failures,
                account.cooldown_until.map(|t| t.to_rfc3339()),
                account.last_used_at.map(|t| t.to_rfc3339()),
                now,
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, username: &str) -> StorageResult<Option<Account>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE username = ?1",
            ACCOUNT_COLUMNS
        ))?;

        let raw = stmt
            .query_row(params![username], account_from_row)
            .optional()?;

        raw.map(finish_account).transpose()
    }

    fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM accounts ORDER BY username",
            ACCOUNT_COLUMNS
        ))?;

        let rows = stmt.query_map([], account_from_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(finish_account(row?)?);
        }
        Ok(accounts)
    }

    fn count_accounts_by_state(&self, state: AccountState) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ===== Unit Completion Log =====

    fn record_unit_outcome(
        &mut self,
        unit: &CrawlUnit,
        outcome: UnitOutcome,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_units (keyword, since, until, outcome, error_message, attempts, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
             ON CONFLICT(keyword, since, until) DO UPDATE SET
                 outcome = excluded.outcome,
                 error_message = excluded.error_message,
                 attempts = attempts + 1,
                 updated_at = excluded.updated_at",
            params![
                unit.keyword,
                unit.chunk.since.to_string(),
                unit.chunk.until.to_string(),
                outcome.to_db_string(),
                error_message,
                now,
            ],
        )?;
        Ok(())
    }

    fn load_unit_outcomes(&self) -> StorageResult<HashMap<String, UnitOutcome>> {
        let mut stmt = self
            .conn
            .prepare("SELECT keyword, since, until, outcome FROM crawl_units")?;

        let rows = stmt.query_map([], |row| {
            let keyword: String = row.get(0)?;
            let since: String = row.get(1)?;
            let until: String = row.get(2)?;
            let outcome: String = row.get(3)?;
            Ok((format!("{}|{}|{}", keyword, since, until), outcome))
        })?;

        let mut outcomes = HashMap::new();
        for row in rows {
            let (key, outcome) = row?;
            let outcome = UnitOutcome::from_db_string(&outcome).ok_or_else(|| {
                StorageError::InvalidColumn {
                    column: "outcome",
                    value: outcome.clone(),
                }
            })?;
            outcomes.insert(key, outcome);
        }
        Ok(outcomes)
    }

    fn count_units_by_outcome(&self, outcome: UnitOutcome) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_units WHERE outcome = ?1",
            params![outcome.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn clear_unit_log(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM crawl_units", [])?;
        Ok(())
    }

    // ===== Result Queries =====

    fn count_results(&self) -> StorageResult<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_results_by_keyword(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT keyword, COUNT(*) FROM results
             GROUP BY keyword ORDER BY COUNT(*) DESC, keyword",
        )?;

        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}

impl ResultSink for SqliteStorage {
    fn append(&mut self, record: &ResultRecord) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO results (id, username, text, date, keyword, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.username,
                record.text,
                record.date.to_rfc3339(),
                record.keyword,
                record.scraped_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }
}
