//! Crawler module for keyword crawl orchestration
//!
//! This module contains the core crawl logic, including:
//! - Date-window chunking and unit planning
//! - Per-unit processing with capping and rate limiting
//! - The worker pool and progress actor
//! - Overall crawl coordination and resumption

mod coordinator;
mod planner;
mod unit;

pub use coordinator::{run_crawl, Coordinator};
pub use planner::{plan, CrawlJob, CrawlUnit, DateChunk, InvalidRangeError};
pub use unit::{normalize_text, CrawlProgress, KeywordProgress, UnitOutcome};

use crate::config::Config;
use crate::DriftnetError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Initialize the storage layer
/// 2. Load or create a crawl run
/// 3. Register accounts with the pool
/// 4. Plan units, dropping completed ones on resume
/// 5. Process units across the worker pool
/// 6. Log the final summary
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `config_hash` - SHA-256 hash of the raw config file, stored on the run
/// * `fresh` - Whether to clear the unit completion log first
///
/// # Returns
///
/// * `Ok(CrawlProgress)` - Crawl finished; counters describe the run
/// * `Err(DriftnetError)` - Crawl failed
pub async fn crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<CrawlProgress, DriftnetError> {
    run_crawl(config, config_hash, fresh).await
}
