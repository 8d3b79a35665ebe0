//! HTML parsing infrastructure
//!
//! Selector-driven extraction of listing records and detail-page CPV codes,
//! with per-record error reporting instead of page-level failure.

pub mod config;
pub mod context;
pub mod cpv_parser;
pub mod error;
pub mod listing_parser;

pub use config::{DetailSelectors, ListingSelectors};
pub use context::ParseContext;
pub use cpv_parser::CpvParser;
pub use error::{ParsingError, ParsingResult};
pub use listing_parser::{PaginationInfo, TenderListParser, parse_publication_date};
