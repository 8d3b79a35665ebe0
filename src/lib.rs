//! tenderwatch - incremental crawler for UK Find a Tender procurement
//! notices.
//!
//! Walks the paginated, newest-first search results, extracts structured
//! tender records, enriches them with CPV classification codes from detail
//! pages, and reconciles everything into an append-only JSON store without
//! duplicates across repeated runs.

pub mod crawling;
pub mod domain;
pub mod infrastructure;

pub use crawling::{CrawlEndReason, CrawlEngine, CrawlSummary, MergeMode, StopPolicy};
pub use domain::tender::TenderRecord;
pub use infrastructure::config::AppConfig;
pub use infrastructure::http_client::{HttpClient, HttpClientConfig, PageFetcher};
pub use infrastructure::store::TenderStore;
