//! Core types for smokestore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Artifact category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Html,
    Screenshot,
    ConsoleLog,
    Metadata,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Html,
        Category::Screenshot,
        Category::ConsoleLog,
        Category::Metadata,
    ];

    /// Directory name used on disk
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Html => "html",
            Category::Screenshot => "screenshot",
            Category::ConsoleLog => "console_log",
            Category::Metadata => "metadata",
        }
    }

    /// File extension used when the caller does not pick one
    pub fn default_extension(&self) -> &'static str {
        match self {
            Category::Html => "html",
            Category::Screenshot => "png",
            Category::ConsoleLog => "json",
            Category::Metadata => "json",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Typed ref tags.
///
/// The well-known fields let filters run against refs alone; anything else
/// goes in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_screenshot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_dom: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_console: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_count: Option<usize>,
    /// Free-form extension slot
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl RefTags {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Overlay `other` onto `self`: set fields in `other` win, extras are merged.
    pub fn merge(&mut self, other: RefTags) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            name,
            url,
            has_screenshot,
            has_dom,
            has_console,
            width,
            height,
            entry_count,
            error_count,
            warning_count
        );
        self.extra.extend(other.extra);
    }

    /// Whether every key/value in `wanted` is present in the extension slot
    pub fn contains_all(&self, wanted: &BTreeMap<String, String>) -> bool {
        wanted
            .iter()
            .all(|(k, v)| self.extra.get(k).map(|have| have == v).unwrap_or(false))
    }
}

/// Immutable pointer to durably stored content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    pub category: Category,
    pub test_id: String,
    /// Location relative to the owning store root, `/`-separated
    pub path: String,
    /// Size of the original (uncompressed) bytes
    pub size: u64,
    /// SHA-256 of the original bytes, hex encoded
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub compressed: bool,
    #[serde(default)]
    pub tags: RefTags,
}

impl StorageRef {
    /// Whether both refs point at byte-identical content
    pub fn same_content(&self, other: &StorageRef) -> bool {
        self.hash == other.hash && self.size == other.size
    }
}

/// Options accepted by every `store()` call
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub test_id: String,
    pub tags: RefTags,
    pub extension: Option<String>,
    /// Record timestamp; defaults to the time of the write
    pub timestamp: Option<DateTime<Utc>>,
}

impl StoreOptions {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: RefTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Rectangle in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && (x as u64) < self.x as u64 + self.width as u64
            && (y as u64) < self.y as u64 + self.height as u64
    }

    /// Clip to an image of the given size; `None` when nothing remains
    pub fn clip(&self, width: u32, height: u32) -> Option<Region> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Region::new(self.x, self.y, w, h))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Browser viewport size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(crate::Error::InvalidInput(format!(
                "viewport must be non-empty, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_merge() {
        let mut base = RefTags {
            name: Some("home".into()),
            width: Some(10),
            ..Default::default()
        }
        .with_extra("env", "ci");

        base.merge(
            RefTags {
                width: Some(20),
                ..Default::default()
            }
            .with_extra("browser", "chromium"),
        );

        assert_eq!(base.name.as_deref(), Some("home"));
        assert_eq!(base.width, Some(20));
        assert_eq!(base.extra.len(), 2);
    }

    #[test]
    fn test_tags_serialize_sparse() {
        let tags = RefTags {
            has_dom: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&tags).unwrap();
        assert_eq!(json, serde_json::json!({ "has_dom": true }));
    }

    #[test]
    fn test_region_clip() {
        let region = Region::new(90, 90, 20, 20);
        assert_eq!(region.clip(100, 100), Some(Region::new(90, 90, 10, 10)));
        assert_eq!(Region::new(100, 0, 5, 5).clip(100, 100), None);
        assert!(region.contains(95, 95));
        assert!(!region.contains(110, 95));
    }

    #[test]
    fn test_viewport_rejects_empty() {
        assert!(Viewport::new(0, 720).is_err());
        assert!(Viewport::new(1280, 720).is_ok());
    }
}
