//! Storage manager
//!
//! Single entry point composing the DOM, screenshot, console and checkpoint
//! stores. Callers hold only [`StorageRef`]s; bodies are read on demand.

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::assertion::AssertionEngine;
use crate::checkpoint::{CheckpointMetadata, CheckpointQuery, CheckpointState, CheckpointStore};
use crate::console::{ConsoleLogEntry, ConsoleStore};
use crate::content::ContentStore;
use crate::dom::DomStore;
use crate::screenshot::{CompareOptions, DiffResult, ScreenshotSettings, ScreenshotStore};
use crate::types::{Category, RefTags, StorageRef, StoreOptions};
use crate::{Error, Result, StorageConfig};

/// Artifacts and descriptive data for a new checkpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub name: String,
    pub url: String,
    /// Groups artifact records on disk; defaults to the checkpoint name
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub screenshot: Option<Vec<u8>>,
    #[serde(default)]
    pub console_logs: Option<Vec<ConsoleLogEntry>>,
    #[serde(default)]
    pub custom_data: serde_json::Value,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl CaptureRequest {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    pub fn with_console_logs(mut self, entries: Vec<ConsoleLogEntry>) -> Self {
        self.console_logs = Some(entries);
        self
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A checkpoint with its artifact bodies loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedCheckpoint {
    pub checkpoint: CheckpointState,
    pub dom: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub console_logs: Option<Vec<ConsoleLogEntry>>,
}

/// Which artifacts differ between two checkpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDifferences {
    pub dom: bool,
    pub screenshot: bool,
    pub console: bool,
}

impl ArtifactDifferences {
    pub fn any(&self) -> bool {
        self.dom || self.screenshot || self.console
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointComparison {
    pub checkpoint_a: String,
    pub checkpoint_b: String,
    pub differences: ArtifactDifferences,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointUpdate {
    pub metadata: CheckpointMetadata,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Also delete artifacts no other checkpoint references
    pub delete_related_data: bool,
}

/// Record count and original bytes of one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUsage {
    pub records: usize,
    pub bytes: u64,
}

/// Sidecar-derived storage totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub checkpoints: usize,
    pub dom_documents: usize,
    pub screenshots: usize,
    pub console_logs: usize,
    pub stores: BTreeMap<String, StoreUsage>,
    pub total_bytes: u64,
}

/// Facade over every artifact store
pub struct StorageManager {
    config: StorageConfig,
    roots: Vec<(&'static str, Arc<ContentStore>)>,
    dom: Arc<DomStore>,
    screenshots: Arc<ScreenshotStore>,
    console: Arc<ConsoleStore>,
    checkpoints: CheckpointStore,
    assertions: AssertionEngine,
}

impl StorageManager {
    /// Open (creating as needed) the store tree under `config.base_dir`
    pub async fn open(config: StorageConfig) -> Result<Self> {
        config.validate()?;

        let root = |dir: std::path::PathBuf| ContentStore::new(dir, config.verify_integrity, config.compress);
        let (dom_root, screenshot_root, console_root, checkpoint_root) = tokio::try_join!(
            root(config.dom_dir()),
            root(config.screenshot_dir()),
            root(config.console_dir()),
            root(config.checkpoint_dir()),
        )?;
        let (dom_root, screenshot_root, console_root, checkpoint_root) = (
            Arc::new(dom_root),
            Arc::new(screenshot_root),
            Arc::new(console_root),
            Arc::new(checkpoint_root),
        );

        let dom = Arc::new(DomStore::new(dom_root.clone(), config.chunk_size));
        let screenshots = Arc::new(ScreenshotStore::new(
            screenshot_root.clone(),
            ScreenshotSettings::from(&config),
        ));
        let console = Arc::new(ConsoleStore::new(console_root.clone()));
        let checkpoints = CheckpointStore::new(checkpoint_root.clone());
        let assertions = AssertionEngine::new(dom.clone(), console.clone());

        info!("Opened storage at {:?}", config.base_dir);

        Ok(Self {
            roots: vec![
                ("dom", dom_root),
                ("screenshots", screenshot_root),
                ("console", console_root),
                ("checkpoints", checkpoint_root),
            ],
            config,
            dom,
            screenshots,
            console,
            checkpoints,
            assertions,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn dom(&self) -> &DomStore {
        &self.dom
    }

    pub fn screenshots(&self) -> &ScreenshotStore {
        &self.screenshots
    }

    pub fn console(&self) -> &ConsoleStore {
        &self.console
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn assertions(&self) -> &AssertionEngine {
        &self.assertions
    }

    /// Store the provided artifacts concurrently, then the checkpoint record
    pub async fn capture_checkpoint(&self, request: CaptureRequest) -> Result<StorageRef> {
        let timestamp = Utc::now();
        let test_id = request.test_id.clone().unwrap_or_else(|| request.name.clone());
        let options = StoreOptions::new(test_id.clone()).with_tags(RefTags {
            name: Some(request.name.clone()),
            url: Some(request.url.clone()),
            ..Default::default()
        });

        let dom = async {
            match &request.html {
                Some(html) => self.dom.store(html, options.clone()).await.map(Some),
                None => Ok(None),
            }
        };
        let screenshot = async {
            match &request.screenshot {
                Some(bytes) => self.screenshots.store(bytes, options.clone()).await.map(Some),
                None => Ok(None),
            }
        };
        let console = async {
            match &request.console_logs {
                Some(entries) => self.console.store(entries, options.clone()).await.map(Some),
                None => Ok(None),
            }
        };
        let (dom, screenshot, console) = tokio::join!(dom, screenshot, console);

        let written: Vec<(StorageRef, Category)> = [
            (dom.as_ref().ok().cloned().flatten(), Category::Html),
            (screenshot.as_ref().ok().cloned().flatten(), Category::Screenshot),
            (console.as_ref().ok().cloned().flatten(), Category::ConsoleLog),
        ]
        .into_iter()
        .filter_map(|(r, category)| r.map(|r| (r, category)))
        .collect();

        let (dom_ref, screenshot_ref, console_ref) = match (dom, screenshot, console) {
            (Ok(d), Ok(s), Ok(c)) => (d, s, c),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                warn!("Capture of '{}' failed, removing stored artifacts: {}", request.name, e);
                self.discard_artifacts(&written).await;
                return Err(e);
            }
        };

        let state = CheckpointState {
            name: request.name,
            url: request.url,
            timestamp,
            dom_ref,
            screenshot_ref,
            console_ref,
            custom_data: request.custom_data,
            metadata: request.metadata,
        };

        match self.checkpoints.save(&state, &test_id).await {
            Ok(r) => Ok(r),
            Err(e) => {
                warn!("Checkpoint '{}' not saved, removing its artifacts: {}", state.name, e);
                self.discard_artifacts(&written).await;
                Err(e)
            }
        }
    }

    pub async fn load_checkpoint(&self, storage_ref: &StorageRef) -> Result<LoadedCheckpoint> {
        let checkpoint = self.checkpoints.load(storage_ref).await?;

        let dom = async {
            match &checkpoint.dom_ref {
                Some(r) => self.dom.retrieve(r).await.map(Some),
                None => Ok(None),
            }
        };
        let screenshot = async {
            match &checkpoint.screenshot_ref {
                Some(r) => self.screenshots.retrieve(r).await.map(Some),
                None => Ok(None),
            }
        };
        let console_logs = async {
            match &checkpoint.console_ref {
                Some(r) => self.console.retrieve(r).await.map(Some),
                None => Ok(None),
            }
        };
        let (dom, screenshot, console_logs) = tokio::try_join!(dom, screenshot, console_logs)?;

        Ok(LoadedCheckpoint {
            checkpoint,
            dom,
            screenshot,
            console_logs,
        })
    }

    pub async fn query_checkpoints(&self, query: &CheckpointQuery) -> Result<Vec<StorageRef>> {
        self.checkpoints.query(query).await
    }

    pub async fn get_checkpoint_by_name(&self, name: &str) -> Result<Option<StorageRef>> {
        self.checkpoints.by_name(name).await
    }

    pub async fn get_checkpoint_history(&self, url: &str, limit: Option<usize>) -> Result<Vec<StorageRef>> {
        self.checkpoints.history(url, limit).await
    }

    /// Compare two checkpoints by their artifact refs, without reading artifacts
    pub async fn compare_checkpoints(&self, a: &StorageRef, b: &StorageRef) -> Result<CheckpointComparison> {
        let (state_a, state_b) = tokio::try_join!(self.checkpoints.load(a), self.checkpoints.load(b))?;

        let differences = ArtifactDifferences {
            dom: refs_differ(&state_a.dom_ref, &state_b.dom_ref, |x, y| {
                match (DomStore::document_hash(x), DomStore::document_hash(y)) {
                    (Some(hx), Some(hy)) => hx == hy,
                    _ => x.same_content(y),
                }
            }),
            screenshot: refs_differ(&state_a.screenshot_ref, &state_b.screenshot_ref, StorageRef::same_content),
            console: refs_differ(&state_a.console_ref, &state_b.console_ref, StorageRef::same_content),
        };
        debug!(
            "Compared checkpoints '{}' and '{}': {:?}",
            state_a.name, state_b.name, differences
        );

        Ok(CheckpointComparison {
            checkpoint_a: state_a.name,
            checkpoint_b: state_b.name,
            differences,
        })
    }

    /// Pixel comparison of two checkpoints' screenshots
    pub async fn compare_screenshots(
        &self,
        a: &StorageRef,
        b: &StorageRef,
        options: &CompareOptions,
    ) -> Result<DiffResult> {
        let (state_a, state_b) = tokio::try_join!(self.checkpoints.load(a), self.checkpoints.load(b))?;
        let shot = |state: &CheckpointState| {
            state.screenshot_ref.clone().ok_or_else(|| {
                Error::InvalidInput(format!("checkpoint '{}' has no screenshot", state.name))
            })
        };
        let (shot_a, shot_b) = (shot(&state_a)?, shot(&state_b)?);
        self.screenshots.compare(&shot_a, &shot_b, options).await
    }

    /// Merge descriptive metadata; artifact refs are never touched
    pub async fn update_checkpoint(&self, storage_ref: &StorageRef, update: CheckpointUpdate) -> Result<StorageRef> {
        let mut state = self.checkpoints.load(storage_ref).await?;
        state.metadata.merge(update.metadata);
        state.metadata.updated_at = Some(Utc::now());
        let r = self.checkpoints.replace(storage_ref, &state).await?;
        info!("Updated checkpoint '{}'", state.name);
        Ok(r)
    }

    /// New checkpoint record sharing the source's artifacts
    pub async fn clone_checkpoint(&self, storage_ref: &StorageRef, new_name: &str) -> Result<StorageRef> {
        let mut state = self.checkpoints.load(storage_ref).await?;
        let source = std::mem::replace(&mut state.name, new_name.to_string());
        state.timestamp = Utc::now();
        state.metadata.updated_at = None;
        let r = self.checkpoints.save(&state, &storage_ref.test_id).await?;
        info!("Cloned checkpoint '{}' as '{}'", source, new_name);
        Ok(r)
    }

    /// Delete a checkpoint, optionally with the artifacts only it references
    pub async fn delete_checkpoint(&self, storage_ref: &StorageRef, options: DeleteOptions) -> Result<()> {
        let state = if options.delete_related_data {
            match self.checkpoints.load(storage_ref).await {
                Ok(state) => Some(state),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        self.checkpoints.delete(storage_ref).await?;

        if let Some(state) = state {
            let shared = self.referenced_artifacts().await?;
            self.delete_artifacts(&state, &shared).await?;
        }
        info!("Deleted checkpoint {}", storage_ref.path);
        Ok(())
    }

    /// Artifact paths referenced by any remaining checkpoint
    async fn referenced_artifacts(&self) -> Result<HashSet<String>> {
        let refs = self.checkpoints.list().await?;
        let states = try_join_all(refs.iter().map(|r| async move {
            match self.checkpoints.load(r).await {
                Ok(state) => Ok(Some(state)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        }))
        .await?;

        Ok(states
            .iter()
            .flatten()
            .flat_map(artifact_refs)
            .map(|a| a.path.clone())
            .collect())
    }

    /// Delete the artifacts of `state` that are not in `keep`.
    ///
    /// Every deletion is attempted; the first failure is returned.
    async fn delete_artifacts(&self, state: &CheckpointState, keep: &HashSet<String>) -> Result<()> {
        let artifacts = [
            (state.dom_ref.as_ref(), Category::Html),
            (state.screenshot_ref.as_ref(), Category::Screenshot),
            (state.console_ref.as_ref(), Category::ConsoleLog),
        ];
        let mut first_error = None;
        for (r, category) in artifacts {
            let Some(r) = r else { continue };
            if keep.contains(&r.path) {
                debug!("Keeping shared {} artifact {}", category, r.path);
                continue;
            }
            if let Err(e) = self.delete_artifact(r, category).await {
                warn!("Failed to delete {} artifact {}: {}", category, r.path, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Best-effort removal of artifacts written by a capture that failed
    async fn discard_artifacts(&self, written: &[(StorageRef, Category)]) {
        for (r, category) in written {
            if let Err(e) = self.delete_artifact(r, *category).await {
                warn!("Failed to remove {} artifact {}: {}", category, r.path, e);
            }
        }
    }

    async fn delete_artifact(&self, r: &StorageRef, category: Category) -> Result<()> {
        match category {
            Category::Html => self.dom.delete(r).await,
            Category::Screenshot => self.screenshots.delete(r).await,
            _ => self.console.delete(r).await,
        }
    }

    /// Counts and sizes from sidecars; no record body is read
    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();

        for (name, content) in &self.roots {
            let mut usage = StoreUsage::default();
            for category in Category::ALL {
                for r in content.list(category).await? {
                    usage.records += 1;
                    usage.bytes += r.size;
                    match (*name, category) {
                        ("dom", Category::Html) if r.path.ends_with(".manifest") => stats.dom_documents += 1,
                        ("screenshots", Category::Screenshot)
                            if r.tags.extra.get("kind").map(String::as_str) != Some("diff") =>
                        {
                            stats.screenshots += 1
                        }
                        ("console", Category::ConsoleLog) => stats.console_logs += 1,
                        ("checkpoints", Category::Metadata) => stats.checkpoints += 1,
                        _ => {}
                    }
                }
            }
            stats.total_bytes += usage.bytes;
            stats.stores.insert(name.to_string(), usage);
        }

        Ok(stats)
    }
}

fn artifact_refs(state: &CheckpointState) -> impl Iterator<Item = &StorageRef> {
    [&state.dom_ref, &state.screenshot_ref, &state.console_ref]
        .into_iter()
        .flatten()
}

/// Present on exactly one side, or on both with different content
fn refs_differ(
    a: &Option<StorageRef>,
    b: &Option<StorageRef>,
    same: impl Fn(&StorageRef, &StorageRef) -> bool,
) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(x), Some(y)) => !same(x, y),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleLevel;
    use tempfile::TempDir;

    async fn manager(tmp: &TempDir) -> StorageManager {
        StorageManager::open(StorageConfig::with_base_dir(tmp.path())).await.unwrap()
    }

    fn png(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_capture_and_load() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;

        let r = m
            .capture_checkpoint(
                CaptureRequest::new("home", "https://app.test/")
                    .with_html("<html><body><h1>Hi</h1></body></html>")
                    .with_console_logs(vec![ConsoleLogEntry::new(ConsoleLevel::Error, "boom")]),
            )
            .await
            .unwrap();

        assert_eq!(r.tags.has_dom, Some(true));
        assert_eq!(r.tags.has_screenshot, Some(false));
        assert_eq!(r.tags.has_console, Some(true));

        let loaded = m.load_checkpoint(&r).await.unwrap();
        assert_eq!(loaded.dom.as_deref(), Some("<html><body><h1>Hi</h1></body></html>"));
        assert!(loaded.screenshot.is_none());
        assert_eq!(loaded.console_logs.unwrap()[0].message, "boom");
        assert_eq!(loaded.checkpoint.timestamp, r.timestamp);
    }

    #[tokio::test]
    async fn test_compare_checkpoints() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;

        let a = m
            .capture_checkpoint(
                CaptureRequest::new("a", "u")
                    .with_html("<p>same</p>")
                    .with_screenshot(png(4, 4, [255, 0, 0, 255])),
            )
            .await
            .unwrap();
        let b = m
            .capture_checkpoint(
                CaptureRequest::new("b", "u")
                    .with_html("<p>same</p>")
                    .with_screenshot(png(4, 4, [0, 0, 255, 255]))
                    .with_console_logs(Vec::new()),
            )
            .await
            .unwrap();

        let cmp = m.compare_checkpoints(&a, &b).await.unwrap();
        assert!(!cmp.differences.dom);
        assert!(cmp.differences.screenshot);
        assert!(cmp.differences.console);

        let diff = m.compare_screenshots(&a, &b, &CompareOptions::default()).await.unwrap();
        assert_eq!(diff.different_pixels, 16);

        let identical = m.compare_checkpoints(&a, &a).await.unwrap();
        assert!(!identical.differences.any());
    }

    #[tokio::test]
    async fn test_compare_screenshots_requires_both() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;
        let a = m.capture_checkpoint(CaptureRequest::new("a", "u")).await.unwrap();
        let err = m
            .compare_screenshots(&a, &a, &CompareOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_returns_new_ref() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;
        let r = m
            .capture_checkpoint(CaptureRequest::new("home", "u").with_html("<p>x</p>"))
            .await
            .unwrap();
        let before = m.checkpoints().load(&r).await.unwrap();

        let metadata = CheckpointMetadata {
            description: Some("logged in".into()),
            tags: [("suite".to_string(), "smoke".to_string())].into(),
            ..Default::default()
        };
        let updated = m.update_checkpoint(&r, CheckpointUpdate { metadata }).await.unwrap();

        assert_ne!(updated.hash, r.hash);
        assert_eq!(updated.path, r.path);
        assert_eq!(updated.tags.extra.get("suite").map(String::as_str), Some("smoke"));

        let after = m.checkpoints().load(&updated).await.unwrap();
        assert_eq!(after.metadata.description.as_deref(), Some("logged in"));
        assert!(after.metadata.updated_at.is_some());
        assert_eq!(after.dom_ref, before.dom_ref);
        assert_eq!(after.timestamp, before.timestamp);

        let through_old_ref = m.load_checkpoint(&r).await.unwrap();
        assert_eq!(through_old_ref.checkpoint, after);
    }

    #[tokio::test]
    async fn test_failed_capture_leaves_no_artifacts() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;

        let err = m
            .capture_checkpoint(
                CaptureRequest::new("broken", "u")
                    .with_html("<p>x</p>")
                    .with_console_logs(vec![ConsoleLogEntry::new(ConsoleLevel::Log, "hi")])
                    .with_screenshot(b"not an image".to_vec()),
            )
            .await
            .unwrap_err();
        assert!(!err.is_not_found());

        let stats = m.get_storage_stats().await.unwrap();
        assert_eq!(stats.checkpoints, 0);
        assert_eq!(stats.dom_documents, 0);
        assert_eq!(stats.console_logs, 0);
        assert_eq!(stats.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_cascade_delete_reports_artifact_failures() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;
        let r = m
            .capture_checkpoint(
                CaptureRequest::new("home", "u")
                    .with_html("<p>x</p>")
                    .with_console_logs(vec![ConsoleLogEntry::new(ConsoleLevel::Log, "hi")]),
            )
            .await
            .unwrap();
        let state = m.checkpoints().load(&r).await.unwrap();
        let dom_ref = state.dom_ref.unwrap();

        // A directory where the manifest should be cannot be read or removed as a file.
        let (_, dom_root) = m.roots.iter().find(|(name, _)| *name == "dom").unwrap();
        let manifest = dom_root.record_path(&dom_ref.path).unwrap();
        std::fs::remove_file(&manifest).unwrap();
        std::fs::create_dir(&manifest).unwrap();

        let result = m
            .delete_checkpoint(&r, DeleteOptions { delete_related_data: true })
            .await;
        assert!(result.is_err());
        assert!(manifest.exists());

        // The record and the other artifacts are still removed.
        assert!(m.checkpoints().load(&r).await.unwrap_err().is_not_found());
        assert_eq!(m.get_storage_stats().await.unwrap().console_logs, 0);
    }

    #[tokio::test]
    async fn test_cascade_delete_keeps_shared_artifacts() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;
        let original = m
            .capture_checkpoint(CaptureRequest::new("home", "u").with_html("<p>x</p>"))
            .await
            .unwrap();
        let clone = m.clone_checkpoint(&original, "home-copy").await.unwrap();

        m.delete_checkpoint(&original, DeleteOptions { delete_related_data: true })
            .await
            .unwrap();
        let loaded = m.load_checkpoint(&clone).await.unwrap();
        assert_eq!(loaded.dom.as_deref(), Some("<p>x</p>"));

        m.delete_checkpoint(&clone, DeleteOptions { delete_related_data: true })
            .await
            .unwrap();
        let stats = m.get_storage_stats().await.unwrap();
        assert_eq!(stats.checkpoints, 0);
        assert_eq!(stats.dom_documents, 0);
        assert_eq!(stats.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_storage_stats() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp).await;
        m.capture_checkpoint(
            CaptureRequest::new("a", "u")
                .with_html("<p>x</p>")
                .with_screenshot(png(2, 2, [0, 0, 0, 255]))
                .with_console_logs(vec![ConsoleLogEntry::new(ConsoleLevel::Log, "hi")]),
        )
        .await
        .unwrap();
        m.capture_checkpoint(CaptureRequest::new("b", "u")).await.unwrap();

        let stats = m.get_storage_stats().await.unwrap();
        assert_eq!(stats.checkpoints, 2);
        assert_eq!(stats.dom_documents, 1);
        assert_eq!(stats.screenshots, 1);
        assert_eq!(stats.console_logs, 1);
        assert_eq!(stats.stores["dom"].records, 3); // chunk, index, manifest
        assert_eq!(
            stats.total_bytes,
            stats.stores.values().map(|u| u.bytes).sum::<u64>()
        );
    }
}
