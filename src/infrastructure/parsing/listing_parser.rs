//! Listing page parser
//!
//! Extracts one `TenderRecord` per search result plus pagination metadata.
//! Extraction is tolerant by design: a missing sub-element degrades to a
//! default, and only a result with no heading anchor is skipped outright
//! since it cannot be identified or deduplicated.

use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::config::ListingSelectors;
use super::context::ParseContext;
use super::error::{ParsingError, ParsingResult};
use crate::domain::tender::{TenderRecord, tender_id_from_link, truncate_description};

/// Label that doubles as the source of the parsed publication date.
const PUBLICATION_DATE_LABEL: &str = "Publication date";

/// Pagination metadata extracted from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationInfo {
    pub current_page: u32,
    pub max_page: u32,
    pub has_next: bool,
}

impl Default for PaginationInfo {
    fn default() -> Self {
        Self { current_page: 1, max_page: 1, has_next: false }
    }
}

/// Parser for search-result listing pages.
pub struct TenderListParser {
    result_container: Selector,
    heading_link: Selector,
    organisation: Selector,
    description: Selector,
    detail_entry: Selector,
    detail_label: Selector,
    detail_value: Selector,
    pagination: Selector,
    current_page: Selector,
    page_link: Selector,
    next_link: Selector,
}

impl TenderListParser {
    /// Create a parser with the default selector set.
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ListingSelectors::default())
    }

    /// Create a parser from a selector configuration.
    pub fn with_config(selectors: &ListingSelectors) -> ParsingResult<Self> {
        Ok(Self {
            result_container: Self::compile(&selectors.result_container)?,
            heading_link: Self::compile(&selectors.heading_link)?,
            organisation: Self::compile(&selectors.organisation)?,
            description: Self::compile(&selectors.description)?,
            detail_entry: Self::compile(&selectors.detail_entry)?,
            detail_label: Self::compile(&selectors.detail_label)?,
            detail_value: Self::compile(&selectors.detail_value)?,
            pagination: Self::compile(&selectors.pagination)?,
            current_page: Self::compile(&selectors.current_page)?,
            page_link: Self::compile(&selectors.page_link)?,
            next_link: Self::compile(&selectors.next_link)?,
        })
    }

    fn compile(selector: &str) -> ParsingResult<Selector> {
        Selector::parse(selector)
            .map_err(|e| ParsingError::invalid_selector(selector, e))
    }

    /// Parse a listing page into records and pagination metadata.
    ///
    /// Per-record extraction failures are logged and skipped; the page as a
    /// whole never fails once the document parsed.
    pub fn parse(&self, html: &Html, context: &ParseContext) -> (Vec<TenderRecord>, PaginationInfo) {
        let mut records = Vec::new();

        for (index, container) in html.select(&self.result_container).enumerate() {
            match self.extract_record(&container, context) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Skipping result {} on page {}: {}",
                        index, context.page, e
                    );
                }
            }
        }

        let pagination = self.extract_pagination(html);
        debug!(
            "Parsed {} records from page {} (page {}/{}, next: {})",
            records.len(),
            context.page,
            pagination.current_page,
            pagination.max_page,
            pagination.has_next
        );

        (records, pagination)
    }

    fn extract_record(
        &self,
        container: &ElementRef,
        context: &ParseContext,
    ) -> ParsingResult<TenderRecord> {
        // The heading anchor is the only hard requirement: without it there
        // is no title, no link and no identifier.
        let anchor = container
            .select(&self.heading_link)
            .next()
            .ok_or_else(|| ParsingError::required_field_missing("title/link", "search result"))?;

        let title = element_text(&anchor);
        let href = anchor
            .value()
            .attr("href")
            .ok_or_else(|| ParsingError::required_field_missing("href", "heading anchor"))?;

        let link = resolve_url(href, &context.base_url)?;
        let tender_id = tender_id_from_link(&link)
            .ok_or_else(|| ParsingError::required_field_missing("tender_id", &link))?;

        let organisation = container
            .select(&self.organisation)
            .next()
            .map(|e| element_text(&e))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "N/A".to_string());

        // Description blocks share a generic class; only the one whose id
        // actually mentions "description" qualifies.
        let description = container
            .select(&self.description)
            .find(|e| {
                e.value()
                    .attr("id")
                    .is_some_and(|id| id.contains("description"))
            })
            .map(|e| truncate_description(&element_text(&e)))
            .unwrap_or_default();

        let mut details = IndexMap::new();
        let mut publication_date_text = None;
        let mut publication_date_parsed = None;

        for entry in container.select(&self.detail_entry) {
            let label = entry.select(&self.detail_label).next().map(|e| element_text(&e));
            let value = entry.select(&self.detail_value).next().map(|e| element_text(&e));
            let (Some(label), Some(value)) = (label, value) else {
                continue;
            };

            if label.contains(PUBLICATION_DATE_LABEL) {
                publication_date_text = Some(value.clone());
                publication_date_parsed = parse_publication_date(&value);
            }
            details.insert(label, value);
        }

        Ok(TenderRecord {
            title,
            link,
            organisation,
            description,
            details,
            publication_date_text,
            publication_date_parsed,
            scraped_at: Utc::now(),
            tender_id,
            cpv_codes: Vec::new(),
            cpv_descriptions: Vec::new(),
        })
    }

    fn extract_pagination(&self, html: &Html) -> PaginationInfo {
        let mut info = PaginationInfo::default();

        let Some(pagination) = html.select(&self.pagination).next() else {
            return info;
        };

        if let Some(current) = pagination.select(&self.current_page).next() {
            if let Ok(page) = element_text(&current).parse::<u32>() {
                info.current_page = page;
            }
        }

        info.max_page = pagination
            .select(&self.page_link)
            .filter_map(|link| element_text(&link).parse::<u32>().ok())
            .max()
            .unwrap_or(1)
            .max(info.current_page);

        info.has_next = pagination.select(&self.next_link).next().is_some();

        info
    }
}

/// Parse a publication date of the form `"<day> <MonthName> <year>[, <time>]"`.
///
/// Only the portion before the first comma is considered. A mismatch is
/// logged and yields `None`; it is never fatal.
pub fn parse_publication_date(text: &str) -> Option<NaiveDate> {
    let date_part = text.split(',').next().unwrap_or(text).trim();
    match NaiveDate::parse_from_str(date_part, "%d %B %Y") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!("Could not parse publication date '{}': {}", text, e);
            None
        }
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolve a possibly-relative href against the base URL and validate the
/// result.
pub fn resolve_url(href: &str, base_url: &str) -> ParsingResult<String> {
    let base = Url::parse(base_url).map_err(|e| ParsingError::UrlResolutionFailed {
        url: base_url.to_string(),
        reason: format!("invalid base URL: {e}"),
        base_url: None,
    })?;

    let resolved = base.join(href).map_err(|e| ParsingError::UrlResolutionFailed {
        url: href.to_string(),
        reason: format!("failed to join URL: {e}"),
        base_url: Some(base_url.to_string()),
    })?;

    Ok(resolved.to_string())
}
