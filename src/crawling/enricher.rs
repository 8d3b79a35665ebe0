//! Detail-page CPV enrichment
//!
//! Best-effort secondary fetch per record: resolve the detail link to an
//! absolute URL, fetch the page and scan it for CPV codes. Any failure
//! yields an empty result and never fails the parent record.

use std::sync::Arc;

use scraper::Html;
use tracing::{debug, warn};
use url::Url;

use crate::domain::tender::{CpvCode, TenderRecord};
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::parsing::{CpvParser, DetailSelectors, ParsingResult};

/// Fetches and parses CPV classification codes for individual records.
pub struct CpvEnricher {
    fetcher: Arc<dyn PageFetcher>,
    parser: CpvParser,
    base_url: String,
}

impl CpvEnricher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        selectors: &DetailSelectors,
        base_url: impl Into<String>,
    ) -> ParsingResult<Self> {
        Ok(Self {
            fetcher,
            parser: CpvParser::with_config(selectors)?,
            base_url: base_url.into(),
        })
    }

    /// Attach CPV data to a record. Logs and leaves the record untouched on
    /// any failure.
    pub async fn enrich(&self, record: &mut TenderRecord) {
        let cpvs = self.fetch_cpvs(&record.link).await;
        if cpvs.is_empty() {
            debug!("No CPV codes for tender {}", record.tender_id);
            return;
        }
        record.set_cpv(cpvs);
    }

    async fn fetch_cpvs(&self, link: &str) -> Vec<CpvCode> {
        let Some(url) = self.resolve_detail_url(link) else {
            warn!("Skipping CPV enrichment, unresolvable detail link: {}", link);
            return Vec::new();
        };

        match self.fetcher.fetch_text(&url).await {
            Ok(body) => {
                let html = Html::parse_document(&body);
                self.parser.parse(&html)
            }
            Err(e) => {
                warn!("CPV enrichment fetch failed for {}: {}", url, e);
                Vec::new()
            }
        }
    }

    /// Resolve the detail link against the base URL; only well-formed
    /// absolute http(s) URLs qualify.
    fn resolve_detail_url(&self, link: &str) -> Option<String> {
        let base = Url::parse(&self.base_url).ok()?;
        let resolved = base.join(link).ok()?;
        matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
    }
}
