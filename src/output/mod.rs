//! Output module for reporting on crawl data
//!
//! This module reads the crawl database and produces human-readable
//! summaries for the `--stats` mode.

mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
