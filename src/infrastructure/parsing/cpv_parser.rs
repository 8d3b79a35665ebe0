//! Detail page parser for CPV classification codes
//!
//! Scans the bullet list on a notice detail page for entries of the form
//! `"<8-digit code> - <description>"`, preserving document order.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use super::config::DetailSelectors;
use super::error::{ParsingError, ParsingResult};
use crate::domain::tender::CpvCode;

static CPV_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8}) - (.+)$").expect("CPV pattern is valid"));

/// Parser for CPV code bullet lists on detail pages.
pub struct CpvParser {
    list_item: Selector,
}

impl CpvParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&DetailSelectors::default())
    }

    pub fn with_config(selectors: &DetailSelectors) -> ParsingResult<Self> {
        let list_item = Selector::parse(&selectors.cpv_list_item)
            .map_err(|e| ParsingError::invalid_selector(&selectors.cpv_list_item, e))?;
        Ok(Self { list_item })
    }

    /// Extract all CPV codes from a detail page, in document order.
    ///
    /// Items that do not match the code pattern are ignored; a page with no
    /// matching items yields an empty vec, never an error.
    pub fn parse(&self, html: &Html) -> Vec<CpvCode> {
        let mut cpvs = Vec::new();

        for item in html.select(&self.list_item) {
            let text = item.text().collect::<String>();
            let text = text.trim();
            if let Some(caps) = CPV_ITEM_RE.captures(text) {
                cpvs.push(CpvCode {
                    code: caps[1].to_string(),
                    description: caps[2].trim().to_string(),
                });
            }
        }

        debug!("Extracted {} CPV codes from detail page", cpvs.len());
        cpvs
    }
}
