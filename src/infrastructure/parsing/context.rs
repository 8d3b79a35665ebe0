//! Parsing context for HTML extraction.

/// Context carried through listing-page parsing.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Page number being parsed, for log provenance.
    pub page: u32,

    /// Base URL for resolving relative links.
    pub base_url: String,
}

impl ParseContext {
    pub fn new(page: u32, base_url: impl Into<String>) -> Self {
        Self { page, base_url: base_url.into() }
    }
}
