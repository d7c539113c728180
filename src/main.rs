//! Driftnet main entry point
//!
//! This is the command-line interface for the driftnet crawl orchestrator.

use clap::Parser;
use driftnet::config::load_config_with_hash;
use driftnet::crawler::crawl;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Driftnet: a keyword crawl orchestrator
///
/// Driftnet runs a keyword × date-window crawl against an authenticated
/// search provider, spreading request load across a pool of accounts and
/// streaming deduplicated results into SQLite with per-unit resumability.
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(version)]
#[command(about = "A keyword crawl orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, clearing the unit completion log
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show the planned units without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("driftnet=info,warn"),
            1 => EnvFilter::new("driftnet=debug,info"),
            2 => EnvFilter::new("driftnet=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the planned units
fn handle_dry_run(config: &driftnet::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    use driftnet::CrawlJob;

    println!("=== Driftnet Dry Run ===\n");

    println!("Job Configuration:");
    println!("  Keywords: {}", config.job.keywords.join(", "));
    println!(
        "  Date range: {} to {} (exclusive)",
        config.job.start_date, config.job.end_date
    );
    println!("  Chunk width: {} days", config.job.chunk_days);
    println!("  Max records per unit: {}", config.job.max_per_chunk);
    println!(
        "  Delays: {}ms per item, {}ms per unit",
        config.job.request_delay_ms, config.job.chunk_delay_ms
    );
    println!("  Max workers: {}", config.job.max_workers);

    println!("\nPool:");
    println!("  Accounts file: {}", config.pool.accounts_path);
    println!("  Ban threshold: {}", config.pool.ban_threshold);
    println!(
        "  Cooldown: {}s base, {}s cap",
        config.pool.cooldown_base_secs, config.pool.cooldown_max_secs
    );

    println!("\nProvider:");
    println!("  Base URL: {}", config.provider.base_url);
    println!("  Timeout: {}s", config.provider.timeout_secs);
    println!("  Page size: {}", config.provider.page_size);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let job = CrawlJob::from_config(&config.job);
    let units = job.units()?;
    println!("\nPlanned Units ({}):", units.len());
    for unit in &units {
        println!("  - {}", unit);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} units", units.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &driftnet::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    use driftnet::output::{load_statistics, print_statistics};
    use driftnet::storage::SqliteStorage;
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: driftnet::config::Config,
    config_hash: &str,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (clearing unit completion log)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }

    tracing::info!(
        "Keywords: {}, range: {} to {}",
        config.job.keywords.len(),
        config.job.start_date,
        config.job.end_date
    );

    // Unit failures and skips are in the counters; a nonzero count is not
    // a process failure.
    match crawl(config, config_hash, fresh).await {
        Ok(progress) => {
            tracing::info!(
                "Crawl completed: {} records accepted",
                progress.records_accepted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
