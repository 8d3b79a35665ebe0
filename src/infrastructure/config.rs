//! Application configuration
//!
//! Explicitly constructed configuration passed into the crawl engine; no
//! ambient globals. A JSON config file can override any subset of the
//! defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::http_client::HttpClientConfig;
use super::parsing::{DetailSelectors, ListingSelectors};

/// Default constants for the Find a Tender source.
pub mod defaults {
    pub const BASE_URL: &str = "https://www.find-tender.service.gov.uk";
    /// Search results pinned to newest-first publication order, which the
    /// date-based and known-id stop policies rely on.
    pub const START_URL: &str =
        "https://www.find-tender.service.gov.uk/Search/Results?sort=unix_published_date%3ADESC";
    pub const OUTPUT_FILE: &str = "output/tender_opportunities.json";
    /// Fixed politeness pause between listing-page fetches.
    pub const PAGE_DELAY_MS: u64 = 2000;
    /// Shorter pause for incremental runs, which only revisit the newest
    /// pages.
    pub const PAGE_DELAY_INCREMENTAL_MS: u64 = 1000;
    /// Page cap for unscoped full crawls; incremental runs stop on their
    /// own via the known-id policy.
    pub const MAX_PAGES_FULL: u32 = 5;
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL for resolving relative detail links.
    pub base_url: String,
    /// Listing endpoint for page 1; further pages append `&page=N`.
    pub start_url: String,
    /// Canonical store file path.
    pub output_file: PathBuf,
    /// Politeness delay between listing-page fetches, in milliseconds.
    pub page_delay_ms: u64,
    /// Fetch detail pages for CPV classification codes.
    pub enrich_cpv: bool,
    pub http: HttpClientConfig,
    pub listing_selectors: ListingSelectors,
    pub detail_selectors: DetailSelectors,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            start_url: defaults::START_URL.to_string(),
            output_file: PathBuf::from(defaults::OUTPUT_FILE),
            page_delay_ms: defaults::PAGE_DELAY_MS,
            enrich_cpv: true,
            http: HttpClientConfig::default(),
            listing_selectors: ListingSelectors::default(),
            detail_selectors: DetailSelectors::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// their defaults; an unreadable or malformed file is an error.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::default();
        assert!(config.start_url.starts_with(config.base_url.as_str()));
        assert!(config.page_delay_ms >= 1000);
        assert!(config.enrich_cpv);
    }

    #[tokio::test]
    async fn test_partial_config_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "page_delay_ms": 500, "enrich_cpv": false }"#).unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.page_delay_ms, 500);
        assert!(!config.enrich_cpv);
        assert_eq!(config.base_url, defaults::BASE_URL);
    }

    #[tokio::test]
    async fn test_missing_config_file_is_an_error() {
        let result = AppConfig::load(Path::new("/nonexistent/config.json")).await;
        assert!(result.is_err());
    }
}
