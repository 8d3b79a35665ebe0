//! Crawl orchestrator
//!
//! Drives the page loop: fetch listing page, parse, evaluate the stop
//! condition, enrich surviving records, merge into the store, then advance
//! or terminate. Owns the politeness delay and the page bound.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::enricher::CpvEnricher;
use super::stop::{HaltReason, StopPolicy};
use crate::domain::tender::TenderRecord;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::parsing::{PaginationInfo, ParseContext, TenderListParser};
use crate::infrastructure::store::TenderStore;

/// How merged records reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Rewrite the store after every page; new records are appended. A
    /// crash loses at most one page.
    ProgressivePerPage,
    /// Accumulate the whole run, then place new records before old ones in
    /// one rewrite. Keeps the store newest-first for incremental runs.
    PrependOnComplete,
}

/// Why the crawl loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEndReason {
    Halted(HaltReason),
    NoResultsOnPage(u32),
    PaginationExhausted,
    PageBoundReached(u32),
    FetchFailed(String),
    StoreFailed(String),
}

impl fmt::Display for CrawlEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted(reason) => write!(f, "stop condition: {reason}"),
            Self::NoResultsOnPage(page) => write!(f, "no results on page {page}"),
            Self::PaginationExhausted => write!(f, "reached the last page"),
            Self::PageBoundReached(bound) => write!(f, "page bound of {bound} reached"),
            Self::FetchFailed(e) => write!(f, "page fetch failed: {e}"),
            Self::StoreFailed(e) => write!(f, "store write failed: {e}"),
        }
    }
}

/// Run-level outcome, logged as the final summary of every run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub pages_fetched: u32,
    pub records_seen: usize,
    pub records_kept: usize,
    pub new_records: usize,
    #[serde(skip)]
    pub end_reason: CrawlEndReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The crawl engine. Construct with an explicit fetcher, store and policy;
/// no ambient globals, so tests can inject fake transports.
pub struct CrawlEngine {
    fetcher: Arc<dyn PageFetcher>,
    list_parser: TenderListParser,
    enricher: Option<CpvEnricher>,
    store: TenderStore,
    policy: StopPolicy,
    merge_mode: MergeMode,
    start_url: String,
    base_url: String,
    page_delay: Duration,
    max_pages: Option<u32>,
}

impl CrawlEngine {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: TenderStore,
        policy: StopPolicy,
        merge_mode: MergeMode,
        max_pages: Option<u32>,
        config: &AppConfig,
    ) -> Result<Self> {
        let list_parser = TenderListParser::with_config(&config.listing_selectors)?;
        let enricher = if config.enrich_cpv {
            Some(CpvEnricher::new(
                Arc::clone(&fetcher),
                &config.detail_selectors,
                config.base_url.clone(),
            )?)
        } else {
            None
        };

        Ok(Self {
            fetcher,
            list_parser,
            enricher,
            store,
            policy,
            merge_mode,
            start_url: config.start_url.clone(),
            base_url: config.base_url.clone(),
            page_delay: Duration::from_millis(config.page_delay_ms),
            max_pages,
        })
    }

    /// The store, for inspection after a run.
    pub fn store(&self) -> &TenderStore {
        &self.store
    }

    /// Run the crawl to completion. Fetch and store failures end the run
    /// but are not an error here: whatever was merged before the failure
    /// stays persisted, and the final summary is logged on every path. The
    /// failure is carried in the summary's end reason for the caller to
    /// act on.
    pub async fn run(&mut self) -> Result<CrawlSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting crawl {} from {}", run_id, self.start_url);

        let mut page: u32 = 1;
        let mut pages_fetched: u32 = 0;
        let mut records_seen: usize = 0;
        let mut records_kept: usize = 0;
        let mut new_records: usize = 0;
        let mut run_accumulator: Vec<TenderRecord> = Vec::new();

        let mut end_reason = loop {
            if let Some(bound) = self.max_pages {
                if page > bound {
                    break CrawlEndReason::PageBoundReached(bound);
                }
            }

            let url = self.page_url(page);
            info!("Fetching page {}: {}", page, url);

            let body = match self.fetcher.fetch_text(&url).await {
                Ok(body) => body,
                Err(e) => {
                    error!("Fetch failed on page {}: {}", page, e);
                    break CrawlEndReason::FetchFailed(e.to_string());
                }
            };
            pages_fetched += 1;

            // Html is not Send; parse in a scope that ends before the next
            // await point.
            let (records, pagination) = {
                let html = Html::parse_document(&body);
                let context = ParseContext::new(page, self.base_url.clone());
                self.list_parser.parse(&html, &context)
            };

            if records.is_empty() {
                warn!("No results on page {}", page);
                break CrawlEndReason::NoResultsOnPage(page);
            }
            records_seen += records.len();

            let verdict = self.policy.evaluate_page(records);
            records_kept += verdict.kept.len();

            let mut kept = verdict.kept;
            if let Some(enricher) = &self.enricher {
                for record in &mut kept {
                    enricher.enrich(record).await;
                }
            }

            match self.merge_mode {
                MergeMode::ProgressivePerPage => {
                    match self.store.merge_append(kept, page).await {
                        Ok(merged) => new_records += merged,
                        Err(e) => {
                            error!("Store write failed on page {}: {}", page, e);
                            break CrawlEndReason::StoreFailed(e.to_string());
                        }
                    }
                }
                MergeMode::PrependOnComplete => {
                    run_accumulator.extend(kept);
                }
            }

            if let Some(halt) = verdict.halt {
                break CrawlEndReason::Halted(halt);
            }
            if !Self::has_more_pages(&pagination) {
                break CrawlEndReason::PaginationExhausted;
            }

            page += 1;
            sleep(self.page_delay).await;
        };

        if self.merge_mode == MergeMode::PrependOnComplete {
            match self.store.merge_prepend(run_accumulator, pages_fetched).await {
                Ok(merged) => new_records = merged,
                Err(e) => {
                    error!("Store write failed: {}", e);
                    end_reason = CrawlEndReason::StoreFailed(e.to_string());
                }
            }
        }

        let summary = CrawlSummary {
            run_id,
            pages_fetched,
            records_seen,
            records_kept,
            new_records,
            end_reason,
            started_at,
            finished_at: Utc::now(),
        };
        self.log_summary(&summary);
        Ok(summary)
    }

    fn has_more_pages(pagination: &PaginationInfo) -> bool {
        pagination.current_page < pagination.max_page || pagination.has_next
    }

    /// Page 1 is the start URL as-is; later pages append a page parameter.
    fn page_url(&self, page: u32) -> String {
        if page == 1 {
            self.start_url.clone()
        } else if self.start_url.contains('?') {
            format!("{}&page={}", self.start_url, page)
        } else {
            format!("{}?page={}", self.start_url, page)
        }
    }

    fn log_summary(&self, summary: &CrawlSummary) {
        let elapsed = summary.finished_at - summary.started_at;
        info!("==== Crawl summary ({}) ====", summary.run_id);
        info!("Pages fetched:   {}", summary.pages_fetched);
        info!("Records seen:    {}", summary.records_seen);
        info!("Records kept:    {}", summary.records_kept);
        info!("New in store:    {}", summary.new_records);
        info!("Store total:     {}", self.store.total());
        info!("Ended because:   {}", summary.end_reason);
        info!("Elapsed:         {}s", elapsed.num_seconds());
    }
}
