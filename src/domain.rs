//! Domain module - core entities for procurement-notice crawling.
//!
//! Modern Rust module organization (Rust 2018+ style): each module is its
//! own file in the domain/ directory, with public re-exports here.

pub mod tender;

pub use tender::{CpvCode, TenderRecord, tender_id_from_link, truncate_description};
