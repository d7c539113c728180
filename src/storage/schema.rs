//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the driftnet database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Credential store: account material plus lifecycle state
CREATE TABLE IF NOT EXISTS accounts (
    username TEXT PRIMARY KEY,
    password TEXT NOT NULL,
    email TEXT NOT NULL,
    email_password TEXT NOT NULL,
    state TEXT NOT NULL,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    cooldown_until TEXT,
    last_used_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_state ON accounts(state);

-- Completion log: one row per attempted (keyword, window) unit
CREATE TABLE IF NOT EXISTS crawl_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    since TEXT NOT NULL,
    until TEXT NOT NULL,
    outcome TEXT NOT NULL,
    error_message TEXT,
    attempts INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    UNIQUE(keyword, since, until)
);

CREATE INDEX IF NOT EXISTS idx_crawl_units_outcome ON crawl_units(outcome);

-- Accepted records; the primary key makes appends idempotent
CREATE TABLE IF NOT EXISTS results (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    text TEXT NOT NULL,
    date TEXT NOT NULL,
    keyword TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_keyword ON results(keyword);
"#;

use rusqlite::Connection;

/// Initializes the database schema
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
