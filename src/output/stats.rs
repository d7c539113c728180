//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::accounts::AccountState;
use crate::crawler::UnitOutcome;
use crate::storage::Storage;
use crate::DriftnetError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of accepted results
    pub total_results: u64,

    /// Accepted results per keyword, descending
    pub results_by_keyword: Vec<(String, u64)>,

    /// Count of crawl units by latest outcome
    pub units_by_outcome: HashMap<UnitOutcome, u64>,

    /// Count of accounts by lifecycle state
    pub accounts_by_state: HashMap<AccountState, u64>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(DriftnetError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, DriftnetError> {
    let total_results = storage.count_results()?;
    let results_by_keyword = storage.count_results_by_keyword()?;

    let mut units_by_outcome = HashMap::new();
    for outcome in [
        UnitOutcome::Completed,
        UnitOutcome::Failed,
        UnitOutcome::Skipped,
    ] {
        let count = storage.count_units_by_outcome(outcome)?;
        if count > 0 {
            units_by_outcome.insert(outcome, count);
        }
    }

    let mut accounts_by_state = HashMap::new();
    for state in [
        AccountState::Unregistered,
        AccountState::Active,
        AccountState::Cooldown,
        AccountState::Banned,
    ] {
        let count = storage.count_accounts_by_state(state)?;
        if count > 0 {
            accounts_by_state.insert(state, count);
        }
    }

    Ok(CrawlStatistics {
        total_results,
        results_by_keyword,
        units_by_outcome,
        accounts_by_state,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total results: {}", stats.total_results);
    println!();

    if !stats.results_by_keyword.is_empty() {
        println!("Results by Keyword:");
        for (keyword, count) in &stats.results_by_keyword {
            let percentage = if stats.total_results > 0 {
                (*count as f64 / stats.total_results as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", keyword, count, percentage);
        }
        println!();
    }

    if !stats.units_by_outcome.is_empty() {
        println!("Units by Outcome:");
        let mut outcome_counts: Vec<_> = stats.units_by_outcome.iter().collect();
        outcome_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (outcome, count) in outcome_counts {
            println!("  {}: {}", outcome, count);
        }
        println!();
    }

    if !stats.accounts_by_state.is_empty() {
        println!("Accounts by State:");
        let mut state_counts: Vec<_> = stats.accounts_by_state.iter().collect();
        state_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (state, count) in state_counts {
            println!("  {}: {}", state, count);
        }
        println!();
    }

    let completed = stats
        .units_by_outcome
        .get(&UnitOutcome::Completed)
        .copied()
        .unwrap_or(0);
    let total_units: u64 = stats.units_by_outcome.values().sum();
    let completion_rate = if total_units > 0 {
        (completed as f64 / total_units as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Completion Rate: {:.1}% ({} / {} units completed)",
        completion_rate, completed, total_units
    );
}
