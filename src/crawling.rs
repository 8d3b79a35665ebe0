//! Crawling layer: stop-condition evaluation, detail enrichment and the
//! page-loop orchestrator.

pub mod enricher;
pub mod orchestrator;
pub mod stop;

pub use enricher::CpvEnricher;
pub use orchestrator::{CrawlEndReason, CrawlEngine, CrawlSummary, MergeMode};
pub use stop::{HaltReason, PageVerdict, StopPolicy};
