//! Checkpoint records
//!
//! A checkpoint is a small JSON record pointing at the artifacts captured at
//! one moment of a test. Queries run against ref sidecars only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::content::ContentStore;
use crate::types::{Category, RefTags, StorageRef, StoreOptions, Viewport};
use crate::Result;

/// Descriptive checkpoint metadata; the only part that can be updated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CheckpointMetadata {
    /// Overlay an update: set fields win, tags are merged key by key
    pub fn merge(&mut self, update: CheckpointMetadata) {
        if update.description.is_some() {
            self.description = update.description;
        }
        if update.viewport.is_some() {
            self.viewport = update.viewport;
        }
        self.tags.extend(update.tags);
    }
}

/// Snapshot of a page at one point of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub name: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_ref: Option<StorageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<StorageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_ref: Option<StorageRef>,
    #[serde(default)]
    pub custom_data: serde_json::Value,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl CheckpointState {
    /// Tags written next to the record so queries never open it
    fn ref_tags(&self) -> RefTags {
        RefTags {
            name: Some(self.name.clone()),
            url: Some(self.url.clone()),
            has_dom: Some(self.dom_ref.is_some()),
            has_screenshot: Some(self.screenshot_ref.is_some()),
            has_console: Some(self.console_ref.is_some()),
            width: self.metadata.viewport.map(|v| v.width),
            height: self.metadata.viewport.map(|v| v.height),
            extra: self.metadata.tags.clone(),
            ..Default::default()
        }
    }
}

/// Sidecar-only checkpoint filter; every set field must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// User tags that must all be present with equal values
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_screenshot: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CheckpointQuery {
    pub fn matches(&self, r: &StorageRef) -> bool {
        let tags = &r.tags;
        if self.name.is_some() && tags.name != self.name {
            return false;
        }
        if self.url.is_some() && tags.url != self.url {
            return false;
        }
        if let Some(start) = self.start_time {
            if r.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if r.timestamp > end {
                return false;
            }
        }
        if let Some(want) = self.has_screenshot {
            if tags.has_screenshot.unwrap_or(false) != want {
                return false;
            }
        }
        tags.contains_all(&self.tags)
    }
}

/// Checkpoint record store
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    content: Arc<ContentStore>,
}

impl CheckpointStore {
    pub fn new(content: Arc<ContentStore>) -> Self {
        Self { content }
    }

    /// Persist a state; the ref timestamp is the state's timestamp
    pub async fn save(&self, state: &CheckpointState, test_id: &str) -> Result<StorageRef> {
        let body = serde_json::to_vec_pretty(state)?;
        let options = StoreOptions::new(test_id)
            .with_tags(state.ref_tags())
            .with_timestamp(state.timestamp)
            .with_extension("json");
        let r = self.content.store(Category::Metadata, &body, options).await?;
        info!("Saved checkpoint '{}' at {}", state.name, r.path);
        Ok(r)
    }

    /// Load a checkpoint; refs taken before an update see the updated record
    pub async fn load(&self, storage_ref: &StorageRef) -> Result<CheckpointState> {
        let current = self.content.resolve(storage_ref).await?;
        let body = self.content.retrieve(&current).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Rewrite a checkpoint in its slot and return the new ref
    pub async fn replace(&self, storage_ref: &StorageRef, state: &CheckpointState) -> Result<StorageRef> {
        let body = serde_json::to_vec_pretty(state)?;
        let r = self.content.replace(storage_ref, &body, state.ref_tags()).await?;
        debug!("Rewrote checkpoint '{}' at {}", state.name, r.path);
        Ok(r)
    }

    /// Matching refs, newest first
    pub async fn query(&self, query: &CheckpointQuery) -> Result<Vec<StorageRef>> {
        let mut refs: Vec<StorageRef> = self
            .content
            .list(Category::Metadata)
            .await?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        refs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.path.cmp(&b.path)));
        if let Some(limit) = query.limit {
            refs.truncate(limit);
        }
        Ok(refs)
    }

    /// Most recent checkpoint with this name.
    ///
    /// Two records saved with the same timestamp are both kept; which one
    /// is returned is unspecified.
    pub async fn by_name(&self, name: &str) -> Result<Option<StorageRef>> {
        let query = CheckpointQuery {
            name: Some(name.to_string()),
            ..Default::default()
        };
        Ok(self
            .content
            .list(Category::Metadata)
            .await?
            .into_iter()
            .filter(|r| query.matches(r))
            .max_by_key(|r| r.timestamp))
    }

    /// Checkpoints captured at `url`, newest first
    pub async fn history(&self, url: &str, limit: Option<usize>) -> Result<Vec<StorageRef>> {
        self.query(&CheckpointQuery {
            url: Some(url.to_string()),
            limit,
            ..Default::default()
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<StorageRef>> {
        self.query(&CheckpointQuery::default()).await
    }

    pub async fn delete(&self, storage_ref: &StorageRef) -> Result<()> {
        self.content.delete(storage_ref).await
    }
}
