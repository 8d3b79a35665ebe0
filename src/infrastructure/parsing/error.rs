//! Parsing error types for HTML extraction.

use thiserror::Error;

pub type ParsingResult<T> = Result<T, ParsingError>;

#[derive(Error, Debug, Clone)]
pub enum ParsingError {
    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("required field '{field}' not found ({context})")]
    RequiredFieldMissing { field: String, context: String },

    #[error("URL resolution failed for '{url}': {reason}")]
    UrlResolutionFailed {
        url: String,
        reason: String,
        base_url: Option<String>,
    },
}

impl ParsingError {
    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn required_field_missing(field: &str, context: &str) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            context: context.to_string(),
        }
    }
}
