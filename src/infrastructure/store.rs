//! Reconciliation store
//!
//! The durable JSON-backed record set. Loads prior state, merges new unique
//! records, maintains summary metadata and rewrites the file atomically:
//! the new content is written to a temp file, the previous canonical file is
//! copied into the backup directory, then the temp file is renamed over the
//! canonical path. The canonical path is never momentarily absent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::tender::TenderRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A present but unparseable store file. Fatal for the run: there is no
    /// safe base to merge into.
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write store file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Summary metadata kept alongside the record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    #[serde(default)]
    pub total_tenders: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub scraper_version: String,
    #[serde(default)]
    pub pages_scraped: u32,
    /// Newest `scraped_at` ever persisted; feeds the incremental run's
    /// clock-anomaly guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scraped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tenders_this_page: Option<usize>,
}

impl StoreMetadata {
    fn new(source_url: &str) -> Self {
        Self {
            total_tenders: 0,
            last_updated: None,
            source_url: source_url.to_string(),
            scraper_version: env!("CARGO_PKG_VERSION").to_string(),
            pages_scraped: 0,
            last_scraped_at: None,
            new_tenders_this_page: None,
        }
    }
}

/// The persisted structure: metadata plus the full record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreData {
    pub metadata: StoreMetadata,
    #[serde(default)]
    pub tenders: Vec<TenderRecord>,
}

/// JSON-file store with duplicate-free merge and backup-on-overwrite.
pub struct TenderStore {
    path: PathBuf,
    backup_dir: PathBuf,
    data: StoreData,
}

impl TenderStore {
    /// Open the store at `path`, loading prior state if the file exists.
    ///
    /// An absent file is a first run and yields an empty store; a present
    /// but unreadable or unparseable file is fatal.
    pub async fn open(path: impl Into<PathBuf>, source_url: &str) -> Result<Self, StoreError> {
        let path = path.into();
        let backup_dir = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("backups");

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let data: StoreData = serde_json::from_str(&content)
                    .map_err(|e| StoreError::Corrupt { path: path.clone(), source: e })?;
                info!(
                    "Loaded store from {} ({} tenders, {} pages scraped)",
                    path.display(),
                    data.tenders.len(),
                    data.metadata.pages_scraped
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store at {}, starting empty", path.display());
                StoreData { metadata: StoreMetadata::new(source_url), tenders: Vec::new() }
            }
            Err(e) => return Err(StoreError::Read { path, source: e }),
        };

        Ok(Self { path, backup_dir, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[TenderRecord] {
        &self.data.tenders
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.data.metadata
    }

    pub fn total(&self) -> usize {
        self.data.tenders.len()
    }

    /// Identifiers already persisted, for the incremental stop policy.
    pub fn known_ids(&self) -> HashSet<String> {
        self.data.tenders.iter().map(|t| t.tender_id.clone()).collect()
    }

    pub fn last_scraped_at(&self) -> Option<DateTime<Utc>> {
        self.data.metadata.last_scraped_at
    }

    /// Progressive per-page merge: append new unique records and rewrite the
    /// file. Bounds data loss to at most one page on crash.
    ///
    /// Returns the number of records actually merged.
    pub async fn merge_append(
        &mut self,
        records: Vec<TenderRecord>,
        pages_scraped: u32,
    ) -> Result<usize, StoreError> {
        let unique = self.drop_known(records);
        let merged = unique.len();

        self.data.metadata.new_tenders_this_page = Some(merged);
        self.data.metadata.pages_scraped = pages_scraped;
        self.touch_scrape_clock(&unique);
        self.data.tenders.extend(unique);
        self.finalize_and_save().await?;

        info!(
            "Merged {} new tenders (page {}) | total: {}",
            merged, pages_scraped, self.data.metadata.total_tenders
        );
        Ok(merged)
    }

    /// Incremental merge: place new unique records before the existing ones,
    /// preserving the newest-first order the known-id stop policy depends
    /// on, and rewrite the file once.
    pub async fn merge_prepend(
        &mut self,
        records: Vec<TenderRecord>,
        pages_scraped: u32,
    ) -> Result<usize, StoreError> {
        let mut unique = self.drop_known(records);
        let merged = unique.len();

        self.data.metadata.pages_scraped = pages_scraped;
        self.touch_scrape_clock(&unique);
        unique.append(&mut self.data.tenders);
        self.data.tenders = unique;
        self.finalize_and_save().await?;

        info!(
            "Prepended {} new tenders | total: {}",
            merged, self.data.metadata.total_tenders
        );
        Ok(merged)
    }

    /// Drop candidates whose id is already present, including ids introduced
    /// earlier in the same batch. First occurrence wins; existing records
    /// are never overwritten.
    fn drop_known(&self, records: Vec<TenderRecord>) -> Vec<TenderRecord> {
        let mut seen = self.known_ids();
        records
            .into_iter()
            .filter(|record| {
                let fresh = seen.insert(record.tender_id.clone());
                if !fresh {
                    debug!("Skipping duplicate tender {}", record.tender_id);
                }
                fresh
            })
            .collect()
    }

    fn touch_scrape_clock(&mut self, merged: &[TenderRecord]) {
        if let Some(newest) = merged.iter().map(|t| t.scraped_at).max() {
            let current = self.data.metadata.last_scraped_at;
            self.data.metadata.last_scraped_at =
                Some(current.map_or(newest, |prev| prev.max(newest)));
        }
    }

    async fn finalize_and_save(&mut self) -> Result<(), StoreError> {
        self.data.metadata.total_tenders = self.data.tenders.len();
        self.data.metadata.last_updated = Some(Utc::now());
        self.save().await
    }

    /// Write the store durably: temp file, backup copy, atomic rename.
    async fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.data)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Write { path: parent.to_path_buf(), source: e })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| StoreError::Write { path: tmp_path.clone(), source: e })?;

        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            if let Err(e) = self.back_up_current().await {
                // Backup trouble is reported but does not block persisting
                // the new state.
                warn!("Failed to back up {}: {}", self.path.display(), e);
            }
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Write { path: self.path.clone(), source: e })?;

        debug!("Saved {} tenders to {}", self.data.tenders.len(), self.path.display());
        Ok(())
    }

    async fn back_up_current(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "store.json".to_string());
        let backup_path = self
            .backup_dir
            .join(format!("{}.backup_{}", name, Utc::now().timestamp()));
        tokio::fs::copy(&self.path, &backup_path).await?;
        debug!("Backed up store to {}", backup_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    const SOURCE: &str = "https://www.find-tender.service.gov.uk/Search/Results";

    fn record(id: &str, scraped_at: DateTime<Utc>) -> TenderRecord {
        TenderRecord {
            title: format!("Tender {id}"),
            link: format!("https://example.test/Notice/{id}"),
            organisation: "Org".into(),
            description: String::new(),
            details: IndexMap::new(),
            publication_date_text: None,
            publication_date_parsed: None,
            scraped_at,
            tender_id: id.to_string(),
            cpv_codes: Vec::new(),
            cpv_descriptions: Vec::new(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut store = TenderStore::open(&path, SOURCE).await.unwrap();
        store.merge_append(Vec::new(), 0).await.unwrap();

        let reloaded = TenderStore::open(&path, SOURCE).await.unwrap();
        assert_eq!(reloaded.total(), 0);
        assert_eq!(reloaded.metadata().total_tenders, 0);
        assert!(reloaded.records().is_empty());
    }

    #[tokio::test]
    async fn test_merge_rejects_duplicates_across_and_within_batches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = TenderStore::open(&path, SOURCE).await.unwrap();

        let merged = store
            .merge_append(vec![record("a", at(0)), record("b", at(1)), record("a", at(2))], 1)
            .await
            .unwrap();
        assert_eq!(merged, 2);

        let merged = store
            .merge_append(vec![record("b", at(3)), record("c", at(4))], 2)
            .await
            .unwrap();
        assert_eq!(merged, 1);

        let ids: Vec<_> = store.records().iter().map(|t| t.tender_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        // First occurrence wins: "a" keeps its original scrape time.
        assert_eq!(store.records()[0].scraped_at, at(0));
        assert_eq!(store.metadata().total_tenders, 3);
    }

    #[tokio::test]
    async fn test_prepend_places_new_records_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = TenderStore::open(&path, SOURCE).await.unwrap();

        store.merge_append(vec![record("old", at(0))], 1).await.unwrap();
        store
            .merge_prepend(vec![record("new2", at(10)), record("new1", at(11))], 1)
            .await
            .unwrap();

        let ids: Vec<_> = store.records().iter().map(|t| t.tender_id.as_str()).collect();
        assert_eq!(ids, vec!["new2", "new1", "old"]);
        assert_eq!(store.last_scraped_at(), Some(at(11)));
    }

    #[tokio::test]
    async fn test_last_scraped_at_never_goes_backwards() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = TenderStore::open(&path, SOURCE).await.unwrap();

        store.merge_append(vec![record("a", at(100))], 1).await.unwrap();
        store.merge_append(vec![record("b", at(50))], 2).await.unwrap();
        assert_eq!(store.last_scraped_at(), Some(at(100)));
    }

    #[tokio::test]
    async fn test_backup_created_on_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = TenderStore::open(&path, SOURCE).await.unwrap();

        store.merge_append(vec![record("a", at(0))], 1).await.unwrap();
        store.merge_append(vec![record("b", at(1))], 2).await.unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(!backups.is_empty());
        assert!(backups.iter().all(|n| n.starts_with("store.json.backup_")));
        // Canonical file still present and loadable.
        assert_eq!(TenderStore::open(&path, SOURCE).await.unwrap().total(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = TenderStore::open(&path, SOURCE).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_known_ids_and_metadata_counters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = TenderStore::open(&path, SOURCE).await.unwrap();

        store
            .merge_append(vec![record("a", at(0)), record("b", at(1))], 3)
            .await
            .unwrap();

        let reloaded = TenderStore::open(&path, SOURCE).await.unwrap();
        assert!(reloaded.known_ids().contains("a"));
        assert!(reloaded.known_ids().contains("b"));
        assert_eq!(reloaded.metadata().pages_scraped, 3);
        assert_eq!(reloaded.metadata().new_tenders_this_page, Some(2));
        assert!(reloaded.metadata().last_updated.is_some());
    }
}
