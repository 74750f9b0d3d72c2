//! Console log storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::content::ContentStore;
use crate::filter::{CategoryCounts, ErrorFilter, MatchMode};
use crate::types::{Category, StorageRef, StoreOptions};
use crate::Result;

/// Browser console level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 5] = [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
        ConsoleLevel::Debug,
    ];
}

impl std::str::FromStr for ConsoleLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(ConsoleLevel::Log),
            "info" => Ok(ConsoleLevel::Info),
            "warn" | "warning" => Ok(ConsoleLevel::Warn),
            "error" => Ok(ConsoleLevel::Error),
            "debug" => Ok(ConsoleLevel::Debug),
            other => Err(crate::Error::InvalidInput(format!("unknown console level: {}", other))),
        }
    }
}

/// One console message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: ConsoleLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Script location, e.g. `https://app.test/main.js:10:4`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ConsoleLogEntry {
    pub fn new(level: ConsoleLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            stack_trace: None,
            source: None,
        }
    }
}

/// Counts derived from ref tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMetadata {
    pub entry_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub size: u64,
    pub captured_at: DateTime<Utc>,
}

/// Aggregate view of a log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSummary {
    pub total: usize,
    pub by_level: BTreeMap<ConsoleLevel, usize>,
    pub error_count: usize,
    pub warning_count: usize,
    pub unique_errors: Vec<String>,
    pub unique_warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_categories: Option<CategoryCounts>,
}

/// Filter for [`ConsoleStore::query`]; empty fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleQuery {
    #[serde(default)]
    pub levels: Vec<ConsoleLevel>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub mode: MatchMode,
}

/// Console log store
#[derive(Debug, Clone)]
pub struct ConsoleStore {
    content: Arc<ContentStore>,
}

impl ConsoleStore {
    pub fn new(content: Arc<ContentStore>) -> Self {
        Self { content }
    }

    /// Store entries as a JSON array; counts go into the ref tags
    pub async fn store(&self, entries: &[ConsoleLogEntry], options: StoreOptions) -> Result<StorageRef> {
        let body = serde_json::to_vec(entries)?;

        let mut tags = options.tags.clone();
        tags.entry_count = Some(entries.len());
        tags.error_count = Some(count_level(entries, ConsoleLevel::Error));
        tags.warning_count = Some(count_level(entries, ConsoleLevel::Warn));

        let r = self
            .content
            .store(
                Category::ConsoleLog,
                &body,
                StoreOptions {
                    tags,
                    extension: Some("json".into()),
                    ..options
                },
            )
            .await?;
        debug!("Stored {} console entries at {}", entries.len(), r.path);
        Ok(r)
    }

    pub async fn retrieve(&self, storage_ref: &StorageRef) -> Result<Vec<ConsoleLogEntry>> {
        let body = self.content.retrieve(storage_ref).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn query(&self, storage_ref: &StorageRef, query: &ConsoleQuery) -> Result<Vec<ConsoleLogEntry>> {
        let entries = self.retrieve(storage_ref).await?;
        Ok(apply_query(entries, query))
    }

    /// Counts from tags; reads the body only for refs stored without them
    pub async fn get_metadata(&self, storage_ref: &StorageRef) -> Result<ConsoleMetadata> {
        let tags = &storage_ref.tags;
        let (entry_count, error_count, warning_count) =
            match (tags.entry_count, tags.error_count, tags.warning_count) {
                (Some(e), Some(err), Some(w)) => (e, err, w),
                _ => {
                    debug!("Console ref {} has no count tags, reading body", storage_ref.path);
                    let entries = self.retrieve(storage_ref).await?;
                    (
                        entries.len(),
                        count_level(&entries, ConsoleLevel::Error),
                        count_level(&entries, ConsoleLevel::Warn),
                    )
                }
            };
        Ok(ConsoleMetadata {
            entry_count,
            error_count,
            warning_count,
            size: storage_ref.size,
            captured_at: storage_ref.timestamp,
        })
    }

    pub async fn summary(&self, storage_ref: &StorageRef, include_categories: bool) -> Result<ConsoleSummary> {
        let entries = self.retrieve(storage_ref).await?;
        Ok(ErrorFilter::generate_summary(&entries, include_categories))
    }

    pub async fn delete(&self, storage_ref: &StorageRef) -> Result<()> {
        self.content.delete(storage_ref).await
    }
}

pub(crate) fn apply_query(entries: Vec<ConsoleLogEntry>, query: &ConsoleQuery) -> Vec<ConsoleLogEntry> {
    let entries = if query.levels.is_empty() {
        entries
    } else {
        ErrorFilter::filter_by_level(&entries, &query.levels)
    };
    if query.patterns.is_empty() {
        entries
    } else {
        ErrorFilter::filter_by_patterns(&entries, &query.patterns, query.mode).matches
    }
}

fn count_level(entries: &[ConsoleLogEntry], level: ConsoleLevel) -> usize {
    entries.iter().filter(|e| e.level == level).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup(tmp: &TempDir) -> ConsoleStore {
        let content = ContentStore::new(tmp.path(), true, false).await.unwrap();
        ConsoleStore::new(Arc::new(content))
    }

    fn logs() -> Vec<ConsoleLogEntry> {
        vec![
            ConsoleLogEntry::new(ConsoleLevel::Info, "Loaded dashboard"),
            ConsoleLogEntry::new(ConsoleLevel::Warn, "Slow response from /api/items"),
            ConsoleLogEntry::new(ConsoleLevel::Error, "Uncaught ReferenceError: foo is not defined"),
            ConsoleLogEntry::new(ConsoleLevel::Error, "Failed to fetch"),
        ]
    }

    #[tokio::test]
    async fn test_store_tags_counts() {
        let tmp = TempDir::new().unwrap();
        let store = setup(&tmp).await;

        let entries = logs();
        let r = store.store(&entries, StoreOptions::new("t1")).await.unwrap();
        assert_eq!(r.category, Category::ConsoleLog);
        assert_eq!(r.tags.entry_count, Some(4));
        assert_eq!(r.tags.error_count, Some(2));
        assert_eq!(r.tags.warning_count, Some(1));

        assert_eq!(store.retrieve(&r).await.unwrap(), entries);
    }

    #[tokio::test]
    async fn test_metadata_is_tag_only() {
        let tmp = TempDir::new().unwrap();
        let store = setup(&tmp).await;

        let r = store.store(&logs(), StoreOptions::new("t1")).await.unwrap();
        // Remove the body; metadata must still answer from tags.
        std::fs::remove_file(store.content.record_path(&r.path).unwrap()).unwrap();

        let meta = store.get_metadata(&r).await.unwrap();
        assert_eq!(meta.entry_count, 4);
        assert_eq!(meta.error_count, 2);
        assert_eq!(meta.warning_count, 1);
        assert!(store.retrieve(&r).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_query_levels_and_patterns() {
        let tmp = TempDir::new().unwrap();
        let store = setup(&tmp).await;
        let r = store.store(&logs(), StoreOptions::new("t1")).await.unwrap();

        let errors = store
            .query(
                &r,
                &ConsoleQuery {
                    levels: vec![ConsoleLevel::Error],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(errors.len(), 2);

        let fetch = store
            .query(
                &r,
                &ConsoleQuery {
                    levels: vec![ConsoleLevel::Error, ConsoleLevel::Warn],
                    patterns: vec!["FETCH".into()],
                    mode: MatchMode::Contains,
                },
            )
            .await
            .unwrap();
        assert_eq!(fetch.len(), 1);
        assert_eq!(fetch[0].message, "Failed to fetch");
    }

    #[tokio::test]
    async fn test_summary() {
        let tmp = TempDir::new().unwrap();
        let store = setup(&tmp).await;
        let r = store.store(&logs(), StoreOptions::new("t1")).await.unwrap();

        let summary = store.summary(&r, true).await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.error_count, 2);
        let cats = summary.error_categories.unwrap();
        assert_eq!(cats.script, 1);
        assert_eq!(cats.network, 1);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARNING".parse::<ConsoleLevel>().unwrap(), ConsoleLevel::Warn);
        assert!("fatal".parse::<ConsoleLevel>().is_err());
        let level: ConsoleLevel = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(level, ConsoleLevel::Warn);
        assert_eq!(serde_json::to_string(&ConsoleLevel::Error).unwrap(), "\"error\"");
    }
}
