//! Infrastructure layer: HTTP transport, HTML parsing, persistence,
//! configuration and logging.

pub mod config;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod store;

pub use config::AppConfig;
pub use http_client::{FetchError, HttpClient, HttpClientConfig, PageFetcher};
pub use parsing::{
    CpvParser, PaginationInfo, ParseContext, ParsingError, TenderListParser,
};
pub use store::{StoreData, StoreError, StoreMetadata, TenderStore};
