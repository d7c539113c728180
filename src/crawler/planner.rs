//! Date-chunk planning
//!
//! Partitions the crawl's date range into fixed-width windows and expands
//! keywords × windows into the ordered list of crawl units. Pure functions,
//! no state.

use crate::config::JobConfig;
use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Raised when a date range is empty or reversed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid date range: start {start} must be strictly before end {end}")]
pub struct InvalidRangeError {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A half-open date window `[since, until)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateChunk {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl fmt::Display for DateChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.since, self.until)
    }
}

/// Partitions `[start, end)` into contiguous windows of `chunk_days` days
///
/// The final window is narrower when the range does not divide evenly; the
/// union of the windows always equals the input range exactly.
pub fn plan(
    start: NaiveDate,
    end: NaiveDate,
    chunk_days: u32,
) -> Result<Vec<DateChunk>, InvalidRangeError> {
    if start >= end {
        return Err(InvalidRangeError { start, end });
    }

    // Zero width is rejected at config validation; the clamp keeps the
    // loop finite no matter what.
    let width = chrono::Duration::days(i64::from(chunk_days.max(1)));

    let mut chunks = Vec::new();
    let mut current = start;
    while current < end {
        let until = std::cmp::min(current + width, end);
        chunks.push(DateChunk {
            since: current,
            until,
        });
        current = until;
    }
    Ok(chunks)
}

/// The immutable description of one crawl job, constructed at startup
#[derive(Debug, Clone)]
pub struct CrawlJob {
    /// Keywords in processing-priority order
    pub keywords: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub chunk_days: u32,
    /// Maximum accepted records per unit
    pub max_per_chunk: u32,
    /// Sleep between items within a unit
    pub request_delay: Duration,
    /// Sleep between units on one worker
    pub chunk_delay: Duration,
    pub max_workers: u32,
}

impl CrawlJob {
    pub fn from_config(config: &JobConfig) -> Self {
        Self {
            keywords: config.keywords.clone(),
            start_date: config.start_date,
            end_date: config.end_date,
            chunk_days: config.chunk_days,
            max_per_chunk: config.max_per_chunk,
            request_delay: Duration::from_millis(config.request_delay_ms),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            max_workers: config.max_workers,
        }
    }

    /// Expands the job into crawl units in keyword-major, chronological
    /// chunk-minor order
    pub fn units(&self) -> Result<Vec<CrawlUnit>, InvalidRangeError> {
        let chunks = plan(self.start_date, self.end_date, self.chunk_days)?;
        let mut units = Vec::with_capacity(self.keywords.len() * chunks.len());
        for keyword in &self.keywords {
            for chunk in &chunks {
                units.push(CrawlUnit {
                    keyword: keyword.clone(),
                    chunk: *chunk,
                });
            }
        }
        Ok(units)
    }
}

/// One (keyword, window) pair: the smallest independently retryable piece
/// of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlUnit {
    pub keyword: String,
    pub chunk: DateChunk,
}

impl CrawlUnit {
    /// The provider query string for this unit
    pub fn query(&self) -> String {
        format!(
            "{} since:{} until:{}",
            self.keyword, self.chunk.since, self.chunk.until
        )
    }

    /// Stable identity used by the completion log
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.keyword, self.chunk.since, self.chunk.until)
    }
}

impl fmt::Display for CrawlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' [{}]", self.keyword, self.chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plan_even_split() {
        let chunks = plan(date(2023, 1, 12), date(2023, 1, 26), 7).unwrap();
        assert_eq!(
            chunks,
            vec![
                DateChunk {
                    since: date(2023, 1, 12),
                    until: date(2023, 1, 19)
                },
                DateChunk {
                    since: date(2023, 1, 19),
                    until: date(2023, 1, 26)
                },
            ]
        );
    }

    #[test]
    fn test_plan_final_chunk_narrower() {
        let chunks = plan(date(2023, 1, 1), date(2023, 1, 10), 7).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].since, date(2023, 1, 8));
        assert_eq!(chunks[1].until, date(2023, 1, 10));
    }

    #[test]
    fn test_plan_width_larger_than_range() {
        let chunks = plan(date(2023, 1, 1), date(2023, 1, 3), 30).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].since, date(2023, 1, 1));
        assert_eq!(chunks[0].until, date(2023, 1, 3));
    }

    #[test]
    fn test_plan_chunks_are_contiguous_and_cover_range() {
        let start = date(2023, 1, 12);
        let end = date(2025, 7, 4);
        let chunks = plan(start, end, 7).unwrap();

        assert_eq!(chunks.first().unwrap().since, start);
        assert_eq!(chunks.last().unwrap().until, end);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].until, pair[1].since);
            assert!(pair[0].since < pair[0].until);
        }
    }

    #[test]
    fn test_plan_rejects_equal_dates() {
        let day = date(2023, 1, 12);
        assert_eq!(
            plan(day, day, 7),
            Err(InvalidRangeError {
                start: day,
                end: day
            })
        );
    }

    #[test]
    fn test_plan_rejects_reversed_range() {
        assert!(plan(date(2023, 2, 1), date(2023, 1, 1), 7).is_err());
    }

    #[test]
    fn test_units_are_keyword_major() {
        let job = CrawlJob {
            keywords: vec!["rust".to_string(), "tokio".to_string()],
            start_date: date(2023, 1, 12),
            end_date: date(2023, 1, 26),
            chunk_days: 7,
            max_per_chunk: 130,
            request_delay: Duration::from_millis(500),
            chunk_delay: Duration::from_millis(1000),
            max_workers: 4,
        };

        let units = job.units().unwrap();
        assert_eq!(units.len(), 4);
        assert_eq!(units[0].keyword, "rust");
        assert_eq!(units[1].keyword, "rust");
        assert_eq!(units[2].keyword, "tokio");
        assert!(units[0].chunk.since < units[1].chunk.since);
    }

    #[test]
    fn test_unit_query_embeds_date_filter() {
        let unit = CrawlUnit {
            keyword: "rust".to_string(),
            chunk: DateChunk {
                since: date(2023, 1, 12),
                until: date(2023, 1, 19),
            },
        };
        assert_eq!(unit.query(), "rust since:2023-01-12 until:2023-01-19");
        assert_eq!(unit.key(), "rust|2023-01-12|2023-01-19");
    }
}
