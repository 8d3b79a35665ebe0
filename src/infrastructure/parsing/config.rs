//! Selector configuration for HTML extraction.
//!
//! Centralizes the CSS selectors for the listing and detail markup so a
//! markup change on the source site is a config edit, not a code change.

use serde::{Deserialize, Serialize};

/// CSS selectors for listing (search results) pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// One search result per container.
    pub result_container: String,
    /// Heading anchor carrying title and detail link.
    pub heading_link: String,
    /// Organisation sub-header block.
    pub organisation: String,
    /// Free-text description block; only elements whose id contains
    /// "description" are accepted.
    pub description: String,
    /// Label/value entries of the definition list.
    pub detail_entry: String,
    pub detail_label: String,
    pub detail_value: String,
    /// Pagination control block.
    pub pagination: String,
    pub current_page: String,
    pub page_link: String,
    pub next_link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            result_container: "div.search-result".to_string(),
            heading_link: "h2 a".to_string(),
            organisation: "div.search-result-sub-header".to_string(),
            description: "div.wrap-text".to_string(),
            detail_entry: "dl div.search-result-entry".to_string(),
            detail_label: "dt".to_string(),
            detail_value: "dd".to_string(),
            pagination: "ul.gadget-footer-paginate".to_string(),
            current_page: "li.standard-paginate-selected".to_string(),
            page_link: "li.standard-paginate a".to_string(),
            next_link: "a.standard-paginate-next".to_string(),
        }
    }
}

/// CSS selectors for notice detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSelectors {
    /// Bullet list holding "(8-digit code) - (description)" items.
    pub cpv_list_item: String,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            cpv_list_item: "ul.govuk-list.govuk-list--bullet li".to_string(),
        }
    }
}
