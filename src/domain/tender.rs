use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Maximum description length kept on a record; longer text is cut and
/// marked with an ellipsis.
pub const DESCRIPTION_MAX_LEN: usize = 200;

/// One procurement notice as extracted from a listing page.
///
/// Field names follow the persisted store format, so records round-trip
/// through `serde_json` unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderRecord {
    pub title: String,
    /// Absolute URL of the detail page.
    pub link: String,
    pub organisation: String,
    pub description: String,
    /// Label/value pairs from the listing's definition list, in document
    /// order. The schema is open; whatever the source shows is kept.
    pub details: IndexMap<String, String>,
    /// Raw "Publication date" value as shown on the listing.
    pub publication_date_text: Option<String>,
    /// Parsed calendar date, `None` when the raw text did not match the
    /// expected format. Absence is a valid state for consumers.
    pub publication_date_parsed: Option<NaiveDate>,
    pub scraped_at: DateTime<Utc>,
    /// Deduplication key, derived from the last path segment of the detail
    /// link with any query string stripped. A change in the source site's
    /// URL structure invalidates this identifier scheme.
    pub tender_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpv_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpv_descriptions: Vec<String>,
}

impl TenderRecord {
    /// Attach CPV classification data, keeping the code/description arrays
    /// parallel.
    pub fn set_cpv(&mut self, cpvs: Vec<CpvCode>) {
        self.cpv_codes = cpvs.iter().map(|c| c.code.clone()).collect();
        self.cpv_descriptions = cpvs.into_iter().map(|c| c.description).collect();
    }
}

/// An 8-digit procurement classification code with its free-text label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpvCode {
    pub code: String,
    pub description: String,
}

/// Derive the stable record identifier from a detail link.
///
/// Takes the last path segment and strips any query string. Returns `None`
/// for links with no usable segment.
pub fn tender_id_from_link(link: &str) -> Option<String> {
    let id = link
        .rsplit('/')
        .next()?
        .split('?')
        .next()
        .unwrap_or_default();
    if id.is_empty() { None } else { Some(id.to_string()) }
}

/// Truncate free text to the display length, appending an ellipsis marker
/// when anything was cut. Cuts on a char boundary.
pub fn truncate_description(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= DESCRIPTION_MAX_LEN {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(DESCRIPTION_MAX_LEN).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tender_id_from_link() {
        assert_eq!(
            tender_id_from_link("https://example.test/Notice/037510-2025"),
            Some("037510-2025".to_string())
        );
        assert_eq!(
            tender_id_from_link("/Notice/037510-2025?origin=SearchResults&page=1"),
            Some("037510-2025".to_string())
        );
        assert_eq!(tender_id_from_link("https://example.test/Notice/"), None);
    }

    #[test]
    fn test_truncate_description() {
        let short = "A short description";
        assert_eq!(truncate_description(short), short);

        let long = "x".repeat(300);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), DESCRIPTION_MAX_LEN + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_description_multibyte_boundary() {
        let long = "é".repeat(250);
        let truncated = truncate_description(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), DESCRIPTION_MAX_LEN + 3);
    }

    #[test]
    fn test_cpv_arrays_stay_parallel() {
        let mut record = TenderRecord {
            title: "T".into(),
            link: "https://example.test/Notice/1".into(),
            organisation: "Org".into(),
            description: String::new(),
            details: IndexMap::new(),
            publication_date_text: None,
            publication_date_parsed: None,
            scraped_at: Utc::now(),
            tender_id: "1".into(),
            cpv_codes: Vec::new(),
            cpv_descriptions: Vec::new(),
        };
        record.set_cpv(vec![
            CpvCode { code: "45000000".into(), description: "Construction work".into() },
            CpvCode { code: "45262800".into(), description: "Building extension work".into() },
        ]);
        assert_eq!(record.cpv_codes, vec!["45000000", "45262800"]);
        assert_eq!(record.cpv_descriptions.len(), 2);
    }
}
