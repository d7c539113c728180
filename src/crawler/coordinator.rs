//! Crawl coordinator - main orchestration logic
//!
//! This module wires the whole run together:
//! - Initializing storage and the run record
//! - Registering accounts with the pool
//! - Planning units and filtering out completed ones on resume
//! - Spawning the worker pool and the progress actor
//! - Handling interrupts and the final summary

use crate::accounts::{AccountPool, CooldownPolicy};
use crate::config::{load_accounts, Config};
use crate::crawler::planner::{CrawlJob, CrawlUnit};
use crate::crawler::unit::{
    process_unit, CrawlProgress, ProgressEvent, UnitContext, UnitDisposition, UnitOutcome,
};
use crate::provider::{HttpSearchProvider, SearchProvider};
use crate::storage::{RunStatus, SqliteStorage, Storage, StorageResult};
use crate::DriftnetError;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Main crawl coordinator
pub struct Coordinator {
    job: Arc<CrawlJob>,
    pool: Arc<AccountPool>,
    provider: Arc<dyn SearchProvider>,
    storage: Arc<Mutex<SqliteStorage>>,
    acquire_attempts: u32,
    acquire_backoff: Duration,
    run_id: i64,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens storage, creates or resumes the run record, loads the accounts
    /// file and registers every credential with the pool. With `fresh` the
    /// unit completion log is cleared first; accepted results are kept
    /// because the sink absorbs re-crawled records.
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> Result<Self, DriftnetError> {
        let storage_path = Path::new(&config.output.database_path);
        let mut storage = SqliteStorage::new(storage_path)?;

        let run_id = if fresh {
            storage.clear_unit_log()?;
            storage.create_run(config_hash)?
        } else if let Some(latest_run) = storage.get_latest_run()? {
            if matches!(latest_run.status, RunStatus::Running) {
                tracing::info!("Resuming interrupted run {}", latest_run.id);
                latest_run.id
            } else {
                tracing::info!("Starting new run");
                storage.create_run(config_hash)?
            }
        } else {
            tracing::info!("No previous runs found, starting new run");
            storage.create_run(config_hash)?
        };

        let storage = Arc::new(Mutex::new(storage));

        let provider: Arc<dyn SearchProvider> =
            Arc::new(HttpSearchProvider::new(&config.provider)?);

        let policy = CooldownPolicy {
            ban_threshold: config.pool.ban_threshold,
            base: Duration::from_secs(config.pool.cooldown_base_secs),
            max: Duration::from_secs(config.pool.cooldown_max_secs),
        };
        let pool = Arc::new(AccountPool::new(provider.clone(), storage.clone(), policy));

        let credentials = load_accounts(Path::new(&config.pool.accounts_path))?;
        for creds in credentials {
            pool.register(creds)?;
        }
        tracing::info!("Registered {} accounts", pool.account_count());

        Ok(Self {
            job: Arc::new(CrawlJob::from_config(&config.job)),
            pool,
            provider,
            storage,
            acquire_attempts: config.pool.acquire_attempts,
            acquire_backoff: Duration::from_secs(config.pool.acquire_backoff_secs),
            run_id,
        })
    }

    /// Runs the crawl to completion and returns the final progress counters
    ///
    /// Unit-level failures and skips are reflected in the counters, not in
    /// the return value; only infrastructure faults surface as errors.
    pub async fn run(&mut self) -> Result<CrawlProgress, DriftnetError> {
        let units = self.pending_units()?;
        if units.is_empty() {
            tracing::info!("All crawl units already completed, nothing to do");
            self.storage.lock().unwrap().complete_run(self.run_id)?;
            return Ok(CrawlProgress::default());
        }

        // Banned accounts can never serve a unit, so they must not
        // inflate the pool of workers contending for the rest.
        let worker_count = (self.job.max_workers as usize)
            .min(self.pool.usable_count())
            .max(1);
        tracing::info!(
            "Starting crawl run {}: {} units, {} workers",
            self.run_id,
            units.len(),
            worker_count
        );

        let queue = Arc::new(Mutex::new(units.into_iter().collect::<VecDeque<_>>()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let signal_task = tokio::spawn(watch_for_interrupt(shutdown_tx));
        let actor = tokio::spawn(progress_actor(event_rx, self.storage.clone()));

        let start_time = std::time::Instant::now();
        // One run-scoped dedup set shared by every worker
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let ctx = UnitContext {
                job: self.job.clone(),
                pool: self.pool.clone(),
                provider: self.provider.clone(),
                sink: self.storage.clone(),
                seen: seen.clone(),
                events: event_tx.clone(),
                shutdown: shutdown_rx.clone(),
                acquire_attempts: self.acquire_attempts,
                acquire_backoff: self.acquire_backoff,
            };
            workers.push(tokio::spawn(worker_loop(worker_id, ctx, queue.clone())));
        }
        drop(event_tx);

        let mut interrupted = false;
        for worker in workers {
            interrupted |= worker.await?;
        }
        signal_task.abort();

        let progress = actor.await?.map_err(DriftnetError::Storage)?;

        if interrupted {
            // The run record stays open so the next invocation resumes it.
            tracing::warn!(
                "Crawl interrupted after {} of {} attempted units",
                progress.units_completed,
                progress.units_attempted
            );
        } else {
            self.storage.lock().unwrap().complete_run(self.run_id)?;
        }

        tracing::info!(
            "Crawl finished in {:?}: {} completed, {} failed, {} skipped, {} records ({} duplicates rejected)",
            start_time.elapsed(),
            progress.units_completed,
            progress.units_failed,
            progress.units_skipped,
            progress.records_accepted,
            progress.duplicates_rejected
        );
        for (keyword, keyword_progress) in &progress.per_keyword {
            tracing::info!(
                "  {}: {} records across {} completed units",
                keyword,
                keyword_progress.records_accepted,
                keyword_progress.units_completed
            );
        }

        Ok(progress)
    }

    /// Plans all units and drops those whose latest outcome is Completed.
    /// Failed and skipped units are retried.
    fn pending_units(&self) -> Result<Vec<CrawlUnit>, DriftnetError> {
        let all_units = self.job.units()?;
        let total = all_units.len();
        let outcomes = self.storage.lock().unwrap().load_unit_outcomes()?;
        let pending: Vec<CrawlUnit> = all_units
            .into_iter()
            .filter(|unit| outcomes.get(&unit.key()) != Some(&UnitOutcome::Completed))
            .collect();
        if pending.len() < total {
            tracing::info!(
                "Resuming: {} of {} units already completed",
                total - pending.len(),
                total
            );
        }
        Ok(pending)
    }
}

/// Pulls units off the shared queue until it drains or shutdown fires.
/// Returns true if the worker stopped because of shutdown.
async fn worker_loop(
    worker_id: usize,
    ctx: UnitContext,
    queue: Arc<Mutex<VecDeque<CrawlUnit>>>,
) -> bool {
    loop {
        if *ctx.shutdown.borrow() {
            tracing::debug!(worker_id, "worker stopping on shutdown");
            return true;
        }

        let unit = match queue.lock().unwrap().pop_front() {
            Some(unit) => unit,
            None => {
                tracing::debug!(worker_id, "queue drained, worker done");
                return false;
            }
        };

        let _ = ctx.events.send(ProgressEvent::UnitStarted { unit: unit.clone() });
        match process_unit(&ctx, &unit).await {
            UnitDisposition::Recorded { outcome, error } => {
                let _ = ctx.events.send(ProgressEvent::UnitFinished {
                    unit,
                    outcome,
                    error,
                });
            }
            UnitDisposition::Interrupted => {
                tracing::debug!(worker_id, "unit interrupted, worker stopping");
                return true;
            }
        }

        tokio::time::sleep(ctx.job.chunk_delay).await;
    }
}

/// Single writer for the unit completion log. Draining events here keeps
/// outcome rows and counters consistent without per-worker transactions.
async fn progress_actor(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    storage: Arc<Mutex<SqliteStorage>>,
) -> StorageResult<CrawlProgress> {
    let mut progress = CrawlProgress::default();
    while let Some(event) = events.recv().await {
        if let ProgressEvent::UnitFinished {
            unit,
            outcome,
            error,
        } = &event
        {
            storage
                .lock()
                .unwrap()
                .record_unit_outcome(unit, *outcome, error.as_deref())?;
        }
        progress.on_event(&event);
    }
    Ok(progress)
}

async fn watch_for_interrupt(shutdown: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Interrupt received, finishing in-flight items then stopping");
            let _ = shutdown.send(true);
        }
        Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
    }
}

/// Runs the main crawl operation
///
/// # Example
///
/// ```no_run
/// use driftnet::config::load_config_with_hash;
/// use driftnet::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// run_crawl(config, &hash, false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<CrawlProgress, DriftnetError> {
    let mut coordinator = Coordinator::new(config, config_hash, fresh)?;
    coordinator.run().await
}
