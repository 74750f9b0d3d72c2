//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Storage configuration shared by every artifact store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base storage directory
    pub base_dir: PathBuf,

    /// Maximum number of element nodes per DOM chunk
    pub chunk_size: usize,

    /// Thumbnail bounding box width
    pub thumbnail_width: u32,

    /// Thumbnail bounding box height
    pub thumbnail_height: u32,

    /// JPEG quality used for thumbnails (1-100)
    pub quality: u8,

    /// Default per-pixel tolerance for visual diffs (0.0 - 1.0)
    pub tolerance: f64,

    /// Verify hash and size on every retrieve
    pub verify_integrity: bool,

    /// Gzip record bodies at rest
    pub compress: bool,

    /// Entries kept in each decode/thumbnail cache
    pub cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: crate::default_store_path(),
            chunk_size: 1000,
            thumbnail_width: 320,
            thumbnail_height: 240,
            quality: 80,
            tolerance: 0.1,
            verify_integrity: true,
            compress: false,
            cache_capacity: 16,
        }
    }
}

impl StorageConfig {
    /// Default configuration rooted at `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the stores cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.tolerance) {
            return Err(Error::InvalidConfig(format!(
                "tolerance must be within [0, 1], got {}",
                self.tolerance
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(Error::InvalidConfig(format!(
                "quality must be within 1..=100, got {}",
                self.quality
            )));
        }
        if self.thumbnail_width == 0 || self.thumbnail_height == 0 {
            return Err(Error::InvalidConfig(
                "thumbnail dimensions must be non-zero".into(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(Error::InvalidConfig("cache_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the DOM store directory
    pub fn dom_dir(&self) -> PathBuf {
        self.base_dir.join("dom")
    }

    /// Get the screenshot store directory
    pub fn screenshot_dir(&self) -> PathBuf {
        self.base_dir.join("screenshots")
    }

    /// Get the console log store directory
    pub fn console_dir(&self) -> PathBuf {
        self.base_dir.join("console")
    }

    /// Get the checkpoint store directory
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.base_dir.join("checkpoints")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.thumbnail_width, 320);
        assert!(config.verify_integrity);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = StorageConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.quality, 80);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/smokestore.toml");

        let mut config = StorageConfig::with_base_dir(tmp.path());
        config.chunk_size = 50;
        config.compress = true;
        config.save(&path).unwrap();

        let loaded = StorageConfig::load(&path).unwrap();
        assert_eq!(loaded.chunk_size, 50);
        assert!(loaded.compress);
        assert_eq!(loaded.base_dir, tmp.path());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("partial.toml");
        std::fs::write(&path, "tolerance = 0.25\n").unwrap();

        let loaded = StorageConfig::load(&path).unwrap();
        assert_eq!(loaded.tolerance, 0.25);
        assert_eq!(loaded.chunk_size, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StorageConfig::default();
        config.tolerance = 1.5;
        assert!(config.validate().is_err());

        let mut config = StorageConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = StorageConfig::default();
        config.quality = 0;
        assert!(config.validate().is_err());
    }
}
