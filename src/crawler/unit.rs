//! Per-unit crawl processing
//!
//! A crawl unit is processed in isolation: it checks out one account, runs
//! one capped, rate-limited search, and streams accepted records into the
//! sink. Every error is converted to a unit outcome at this boundary; no
//! error from one unit ever propagates to another.

use crate::accounts::{AccountLease, AccountPool, PoolError, ReleaseOutcome};
use crate::crawler::planner::{CrawlJob, CrawlUnit};
use crate::provider::{RawItem, SearchProvider};
use crate::storage::{ResultRecord, ResultSink, StorageResult};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Final outcome of one crawl unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOutcome {
    /// The unit ran to the end of the stream or hit the per-chunk cap
    Completed,

    /// A provider or sink error aborted the unit; retried on the next run
    Failed,

    /// No account could be acquired within the retry budget
    Skipped,
}

impl UnitOutcome {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Per-keyword progress counters
#[derive(Debug, Default, Clone)]
pub struct KeywordProgress {
    pub units_completed: u64,
    pub records_accepted: u64,
}

/// Run-wide progress counters, mutated only by the progress actor
#[derive(Debug, Default, Clone)]
pub struct CrawlProgress {
    pub units_attempted: u64,
    pub units_completed: u64,
    pub units_failed: u64,
    pub units_skipped: u64,
    pub records_accepted: u64,
    pub duplicates_rejected: u64,
    pub per_keyword: BTreeMap<String, KeywordProgress>,
}

/// Events flowing from workers to the progress actor
#[derive(Debug)]
pub(crate) enum ProgressEvent {
    UnitStarted {
        unit: CrawlUnit,
    },
    RecordAccepted {
        keyword: String,
    },
    DuplicateRejected,
    UnitFinished {
        unit: CrawlUnit,
        outcome: UnitOutcome,
        error: Option<String>,
    },
}

impl CrawlProgress {
    pub(crate) fn on_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::UnitStarted { .. } => self.units_attempted += 1,
            ProgressEvent::RecordAccepted { keyword } => {
                self.records_accepted += 1;
                self.per_keyword
                    .entry(keyword.clone())
                    .or_default()
                    .records_accepted += 1;
            }
            ProgressEvent::DuplicateRejected => self.duplicates_rejected += 1,
            ProgressEvent::UnitFinished { unit, outcome, .. } => match outcome {
                UnitOutcome::Completed => {
                    self.units_completed += 1;
                    self.per_keyword
                        .entry(unit.keyword.clone())
                        .or_default()
                        .units_completed += 1;
                }
                UnitOutcome::Failed => self.units_failed += 1,
                UnitOutcome::Skipped => self.units_skipped += 1,
            },
        }
    }
}

/// Everything a worker needs to process units
#[derive(Clone)]
pub(crate) struct UnitContext {
    pub job: Arc<CrawlJob>,
    pub pool: Arc<AccountPool>,
    pub provider: Arc<dyn SearchProvider>,
    pub sink: Arc<Mutex<dyn ResultSink + Send>>,
    /// Run-scoped duplicate set; the sink is the second line of defense
    pub seen: Arc<Mutex<HashSet<String>>>,
    pub events: mpsc::UnboundedSender<ProgressEvent>,
    pub shutdown: watch::Receiver<bool>,
    pub acquire_attempts: u32,
    pub acquire_backoff: Duration,
}

/// What happened to a unit, from the worker's point of view
#[derive(Debug)]
pub(crate) enum UnitDisposition {
    /// The unit reached an outcome that must be logged
    Recorded {
        outcome: UnitOutcome,
        error: Option<String>,
    },
    /// Shutdown interrupted the unit; no outcome is logged so the next
    /// run retries it
    Interrupted,
}

enum AcquireResult {
    Acquired(AccountLease),
    Exhausted(String),
    Failed(String),
    Interrupted,
}

/// Acquires an account with bounded retries on pool exhaustion
async fn acquire_with_retry(ctx: &UnitContext) -> AcquireResult {
    for attempt in 1..=ctx.acquire_attempts {
        if *ctx.shutdown.borrow() {
            return AcquireResult::Interrupted;
        }
        match ctx.pool.acquire().await {
            Ok(lease) => return AcquireResult::Acquired(lease),
            Err(e @ PoolError::Exhausted { .. }) => {
                if attempt == ctx.acquire_attempts {
                    return AcquireResult::Exhausted(e.to_string());
                }
                tracing::warn!(attempt, error = %e, "no account available, backing off");
                tokio::time::sleep(ctx.acquire_backoff).await;
            }
            Err(e) => return AcquireResult::Failed(e.to_string()),
        }
    }
    AcquireResult::Exhausted("no acquire attempts configured".to_string())
}

fn release(ctx: &UnitContext, lease: AccountLease, outcome: ReleaseOutcome) {
    if let Err(e) = ctx.pool.release(lease, outcome) {
        tracing::error!(error = %e, "failed to persist account release");
    }
}

/// Appends a record, retrying once on a write error
fn append_with_retry(ctx: &UnitContext, record: &ResultRecord) -> StorageResult<bool> {
    // Bind the first attempt so its guard drops before the retry re-locks
    let first = ctx.sink.lock().unwrap().append(record);
    match first {
        Ok(inserted) => Ok(inserted),
        Err(e) => {
            tracing::warn!(record = %record.id, error = %e, "sink append failed, retrying once");
            ctx.sink.lock().unwrap().append(record)
        }
    }
}

/// Normalizes item text: newlines collapsed to spaces
pub fn normalize_text(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

/// Converts a raw provider item into an immutable result record
pub(crate) fn to_record(item: RawItem, keyword: &str) -> ResultRecord {
    ResultRecord {
        id: item.id,
        username: item.username,
        text: normalize_text(&item.text),
        date: item.date,
        keyword: keyword.to_string(),
        scraped_at: Utc::now(),
    }
}

/// Processes one crawl unit end to end
///
/// Partial results already appended when a unit fails are retained: the
/// unit is at-least-once, not all-or-nothing.
pub(crate) async fn process_unit(ctx: &UnitContext, unit: &CrawlUnit) -> UnitDisposition {
    let lease = match acquire_with_retry(ctx).await {
        AcquireResult::Acquired(lease) => lease,
        AcquireResult::Exhausted(message) => {
            tracing::warn!(unit = %unit, "{}; skipping unit", message);
            return UnitDisposition::Recorded {
                outcome: UnitOutcome::Skipped,
                error: Some(message),
            };
        }
        AcquireResult::Failed(message) => {
            return UnitDisposition::Recorded {
                outcome: UnitOutcome::Failed,
                error: Some(message),
            };
        }
        AcquireResult::Interrupted => return UnitDisposition::Interrupted,
    };

    let query = unit.query();
    tracing::debug!(unit = %unit, account = %lease.username, query = %query, "starting unit");

    let mut stream = match ctx
        .provider
        .search(&lease.session, &query, ctx.job.max_per_chunk)
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            release(ctx, lease, ReleaseOutcome::TransientFailure);
            return UnitDisposition::Recorded {
                outcome: UnitOutcome::Failed,
                error: Some(e.to_string()),
            };
        }
    };

    let mut accepted: u32 = 0;
    loop {
        // Finish the current item on shutdown, then stop cleanly.
        if *ctx.shutdown.borrow() {
            release(ctx, lease, ReleaseOutcome::Success);
            return UnitDisposition::Interrupted;
        }

        match stream.next().await {
            Ok(Some(item)) => {
                let record = to_record(item, &unit.keyword);
                let fresh = ctx.seen.lock().unwrap().insert(record.id.clone());
                if !fresh {
                    let _ = ctx.events.send(ProgressEvent::DuplicateRejected);
                } else {
                    match append_with_retry(ctx, &record) {
                        Ok(true) => {
                            accepted += 1;
                            let _ = ctx.events.send(ProgressEvent::RecordAccepted {
                                keyword: unit.keyword.clone(),
                            });
                            if accepted % 50 == 0 {
                                tracing::info!(unit = %unit, accepted, "unit progress");
                            }
                        }
                        // Already stored by an earlier run
                        Ok(false) => {
                            let _ = ctx.events.send(ProgressEvent::DuplicateRejected);
                        }
                        Err(e) => {
                            let message =
                                format!("sink write failed for record {}: {}", record.id, e);
                            tracing::error!(unit = %unit, record = %record.id, error = %e, "sink write failed");
                            release(ctx, lease, ReleaseOutcome::Success);
                            return UnitDisposition::Recorded {
                                outcome: UnitOutcome::Failed,
                                error: Some(message),
                            };
                        }
                    }
                }

                if accepted >= ctx.job.max_per_chunk {
                    // Policy, not an error: the window simply had more
                    // results than we want.
                    tracing::info!(
                        unit = %unit,
                        cap = ctx.job.max_per_chunk,
                        "per-chunk cap reached, stopping early"
                    );
                    break;
                }
                tokio::time::sleep(ctx.job.request_delay).await;
            }
            Ok(None) => {
                if accepted == 0 {
                    tracing::info!(unit = %unit, "no results for window");
                }
                break;
            }
            Err(e) => {
                tracing::warn!(unit = %unit, error = %e, "provider error mid-unit, aborting unit");
                release(ctx, lease, ReleaseOutcome::TransientFailure);
                return UnitDisposition::Recorded {
                    outcome: UnitOutcome::Failed,
                    error: Some(e.to_string()),
                };
            }
        }
    }

    release(ctx, lease, ReleaseOutcome::Success);
    UnitDisposition::Recorded {
        outcome: UnitOutcome::Completed,
        error: None,
    }
}
