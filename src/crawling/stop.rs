//! Stop-condition evaluation
//!
//! One parameterized evaluator covers the run modes that decide when a
//! newest-first crawl has seen everything it came for. Evaluation scans a
//! page's records in document order and may truncate the page and signal a
//! hard halt: once signaled, no further pages are fetched.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::domain::tender::TenderRecord;

/// Run-mode stop policy. The feed is assumed sorted newest-first by
/// publication date, which is what makes early halting sound.
#[derive(Debug, Clone)]
pub enum StopPolicy {
    /// Full crawl: keep every record, never halt.
    None,
    /// Keep records published exactly on the target date. A strictly
    /// earlier date halts; a later date (seen before reaching the target)
    /// is skipped.
    TargetDate(NaiveDate),
    /// "Last N days": halt at the first record published before the
    /// threshold, keep everything newer.
    OlderThan(NaiveDate),
    /// Incremental run: halt at the first identifier already persisted, or
    /// when a record's scrape timestamp would not be newer than the last
    /// persisted one (clock-anomaly guard).
    KnownIds {
        ids: HashSet<String>,
        last_scraped_at: Option<DateTime<Utc>>,
    },
}

/// Why the crawl stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    DateBeforeTarget { found: NaiveDate, target: NaiveDate },
    OlderThanThreshold { found: NaiveDate, threshold: NaiveDate },
    KnownId(String),
    ScrapeClockNotNewer {
        scraped_at: DateTime<Utc>,
        last_scraped_at: DateTime<Utc>,
    },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateBeforeTarget { found, target } => {
                write!(f, "publication date {found} is before target {target}")
            }
            Self::OlderThanThreshold { found, threshold } => {
                write!(f, "publication date {found} is older than threshold {threshold}")
            }
            Self::KnownId(id) => write!(f, "tender {id} is already in the store"),
            Self::ScrapeClockNotNewer { scraped_at, last_scraped_at } => write!(
                f,
                "scrape timestamp {scraped_at} is not newer than last recorded {last_scraped_at}"
            ),
        }
    }
}

/// Outcome of evaluating one page: the records to keep, in order, and an
/// optional halt signal. Records after the halting record are discarded.
#[derive(Debug)]
pub struct PageVerdict {
    pub kept: Vec<TenderRecord>,
    pub halt: Option<HaltReason>,
}

impl StopPolicy {
    /// Scan a page's records in order, keeping, skipping or halting per
    /// record.
    pub fn evaluate_page(&self, records: Vec<TenderRecord>) -> PageVerdict {
        let mut kept = Vec::new();

        for record in records {
            match self.judge(&record) {
                Judgement::Keep => kept.push(record),
                Judgement::Skip(why) => {
                    debug!("Skipping tender {}: {}", record.tender_id, why);
                }
                Judgement::Halt(reason) => {
                    info!("Stop condition met at tender {}: {}", record.tender_id, reason);
                    return PageVerdict { kept, halt: Some(reason) };
                }
            }
        }

        PageVerdict { kept, halt: None }
    }

    fn judge(&self, record: &TenderRecord) -> Judgement {
        match self {
            Self::None => Judgement::Keep,

            Self::TargetDate(target) => match record.publication_date_parsed {
                Some(date) if date == *target => Judgement::Keep,
                Some(date) if date < *target => {
                    Judgement::Halt(HaltReason::DateBeforeTarget { found: date, target: *target })
                }
                Some(_) => Judgement::Skip("published after the target date"),
                None => Judgement::Skip("no parseable publication date"),
            },

            Self::OlderThan(threshold) => match record.publication_date_parsed {
                Some(date) if date < *threshold => Judgement::Halt(
                    HaltReason::OlderThanThreshold { found: date, threshold: *threshold },
                ),
                Some(_) => Judgement::Keep,
                None => Judgement::Skip("no parseable publication date"),
            },

            Self::KnownIds { ids, last_scraped_at } => {
                if ids.contains(&record.tender_id) {
                    return Judgement::Halt(HaltReason::KnownId(record.tender_id.clone()));
                }
                if let Some(last) = last_scraped_at {
                    if record.scraped_at <= *last {
                        return Judgement::Halt(HaltReason::ScrapeClockNotNewer {
                            scraped_at: record.scraped_at,
                            last_scraped_at: *last,
                        });
                    }
                }
                Judgement::Keep
            }
        }
    }
}

enum Judgement {
    Keep,
    Skip(&'static str),
    Halt(HaltReason),
}
