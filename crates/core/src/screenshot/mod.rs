//! Screenshot storage, thumbnails and visual diffing

pub mod cache;
pub mod diff;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::content::ContentStore;
use crate::types::{Category, RefTags, StorageRef, StoreOptions};
use crate::{Error, Result};

use cache::HashCache;
pub use diff::{CompareOptions, DiffResult, RegionDiff};

const TAG_FORMAT: &str = "format";
const TAG_KIND: &str = "kind";

/// Header-level facts about a stored screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size: u64,
    pub captured_at: DateTime<Utc>,
}

/// Thumbnail and diff settings
#[derive(Debug, Clone, Copy)]
pub struct ScreenshotSettings {
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub quality: u8,
    pub tolerance: f64,
    pub cache_capacity: usize,
}

impl From<&crate::StorageConfig> for ScreenshotSettings {
    fn from(config: &crate::StorageConfig) -> Self {
        Self {
            thumbnail_width: config.thumbnail_width,
            thumbnail_height: config.thumbnail_height,
            quality: config.quality,
            tolerance: config.tolerance,
            cache_capacity: config.cache_capacity,
        }
    }
}

/// Screenshot store
#[derive(Debug)]
pub struct ScreenshotStore {
    content: Arc<ContentStore>,
    settings: ScreenshotSettings,
    decoded: HashCache<String, RgbaImage>,
    thumbnails: HashCache<(String, u32, u32, u8), Vec<u8>>,
}

impl ScreenshotStore {
    pub fn new(content: Arc<ContentStore>, settings: ScreenshotSettings) -> Self {
        Self {
            content,
            settings,
            decoded: HashCache::new(settings.cache_capacity),
            thumbnails: HashCache::new(settings.cache_capacity),
        }
    }

    /// Store an encoded image. Only the header is read.
    pub async fn store(&self, image_bytes: &[u8], options: StoreOptions) -> Result<StorageRef> {
        let (width, height, format) = read_header(image_bytes)?;

        let mut tags = options.tags.clone();
        tags.width = Some(width);
        tags.height = Some(height);
        tags.extra.insert(TAG_FORMAT.into(), format_name(format).into());

        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let r = self
            .content
            .store(
                Category::Screenshot,
                image_bytes,
                StoreOptions {
                    tags,
                    extension: Some(extension.to_string()),
                    ..options
                },
            )
            .await?;
        debug!("Stored screenshot {} ({}x{} {})", r.path, width, height, format_name(format));
        Ok(r)
    }

    /// Raw image bytes
    pub async fn retrieve(&self, storage_ref: &StorageRef) -> Result<Vec<u8>> {
        self.content.retrieve(storage_ref).await
    }

    /// Metadata from ref tags; falls back to reading the header
    pub async fn metadata(&self, storage_ref: &StorageRef) -> Result<ScreenshotMetadata> {
        let tags = &storage_ref.tags;
        let (width, height, format) = match (tags.width, tags.height, tags.extra.get(TAG_FORMAT)) {
            (Some(w), Some(h), Some(f)) => (w, h, f.clone()),
            _ => {
                let bytes = self.retrieve(storage_ref).await?;
                let (w, h, f) = read_header(&bytes)?;
                (w, h, format_name(f).to_string())
            }
        };
        Ok(ScreenshotMetadata {
            width,
            height,
            format,
            size: storage_ref.size,
            captured_at: storage_ref.timestamp,
        })
    }

    async fn decode(&self, storage_ref: &StorageRef) -> Result<Arc<RgbaImage>> {
        if let Some(img) = self.decoded.get(&storage_ref.hash) {
            return Ok(img);
        }
        let bytes = self.retrieve(storage_ref).await?;
        let img = image::load_from_memory(&bytes)?.to_rgba8();
        Ok(self.decoded.insert(storage_ref.hash.clone(), img))
    }

    /// Aspect-preserving JPEG thumbnail bounded by the configured box
    pub async fn retrieve_thumbnail(&self, storage_ref: &StorageRef) -> Result<Vec<u8>> {
        let s = self.settings;
        let key = (storage_ref.hash.clone(), s.thumbnail_width, s.thumbnail_height, s.quality);
        if let Some(bytes) = self.thumbnails.get(&key) {
            return Ok((*bytes).clone());
        }

        let img = self.decode(storage_ref).await?;
        let (w, h) = thumbnail_size(img.dimensions(), (s.thumbnail_width, s.thumbnail_height));
        let resized = image::imageops::resize(&*img, w, h, image::imageops::FilterType::Triangle);
        let rgb = DynamicImage::ImageRgba8(resized).to_rgb8();

        let mut out = Vec::new();
        DynamicImage::ImageRgb8(rgb).write_with_encoder(JpegEncoder::new_with_quality(&mut out, s.quality))?;

        debug!("Generated {}x{} thumbnail for {}", w, h, storage_ref.path);
        Ok((*self.thumbnails.insert(key, out)).clone())
    }

    /// Pixel-level comparison of two stored screenshots
    pub async fn compare(
        &self,
        ref_a: &StorageRef,
        ref_b: &StorageRef,
        options: &CompareOptions,
    ) -> Result<DiffResult> {
        let tolerance = options.tolerance.unwrap_or(self.settings.tolerance);
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(Error::InvalidInput(format!(
                "tolerance must be within [0, 1], got {}",
                tolerance
            )));
        }

        // Sizes from tags first: a mismatch needs no decode at all.
        if let (Some(aw), Some(ah), Some(bw), Some(bh)) =
            (ref_a.tags.width, ref_a.tags.height, ref_b.tags.width, ref_b.tags.height)
        {
            if (aw, ah) != (bw, bh) {
                warn!("Screenshot dimensions differ: {}x{} vs {}x{}", aw, ah, bw, bh);
                return Ok(DiffResult::dimension_mismatch((aw, ah), (bw, bh)));
            }
            if ref_a.same_content(ref_b) {
                debug!("Screenshots match exactly (same hash)");
                let regions = diff::walk_regions(aw, ah, &options.regions, &options.ignore_regions, |_, _| false);
                return Ok(DiffResult::from_regions(regions));
            }
        }

        let (img_a, img_b) = tokio::try_join!(self.decode(ref_a), self.decode(ref_b))?;
        if img_a.dimensions() != img_b.dimensions() {
            warn!(
                "Screenshot dimensions differ: {:?} vs {:?}",
                img_a.dimensions(),
                img_b.dimensions()
            );
            return Ok(DiffResult::dimension_mismatch(img_a.dimensions(), img_b.dimensions()));
        }

        let (regions, highlight) = diff::diff_images(
            &img_a,
            &img_b,
            tolerance,
            &options.regions,
            &options.ignore_regions,
            options.generate_diff_image,
        );
        let mut result = DiffResult::from_regions(regions);

        if let Some(diff_img) = highlight.filter(|_| result.different_pixels > 0) {
            let mut png = Cursor::new(Vec::new());
            diff_img.write_to(&mut png, ImageFormat::Png)?;
            let tags = RefTags {
                width: Some(diff_img.width()),
                height: Some(diff_img.height()),
                ..Default::default()
            }
            .with_extra(TAG_KIND, "diff")
            .with_extra(TAG_FORMAT, "png");
            let diff_ref = self
                .content
                .store(
                    Category::Screenshot,
                    &png.into_inner(),
                    StoreOptions::new(ref_a.test_id.clone()).with_tags(tags),
                )
                .await?;
            result.diff_image = Some(diff_ref);
        }

        if result.different_pixels > 0 {
            info!(
                "Visual difference between {} and {}: {:.2}% of {} pixels",
                ref_a.path, ref_b.path, result.diff_percentage, result.total_pixels
            );
        }
        Ok(result)
    }

    pub async fn delete(&self, storage_ref: &StorageRef) -> Result<()> {
        self.content.delete(storage_ref).await
    }
}

fn read_header(bytes: &[u8]) -> Result<(u32, u32, ImageFormat)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| Error::InvalidInput("unrecognized image format".into()))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(Error::InvalidInput(format!(
            "unsupported screenshot format: {}",
            format_name(format)
        )));
    }
    let (width, height) = reader.into_dimensions()?;
    Ok((width, height, format))
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        _ => "other",
    }
}

/// Largest size with the same aspect ratio that fits the box; never upscales
fn thumbnail_size((w, h): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    if w <= max_w && h <= max_h {
        return (w.max(1), h.max(1));
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let tw = ((w as f64 * scale).round() as u32).clamp(1, max_w);
    let th = ((h as f64 * scale).round() as u32).clamp(1, max_h);
    (tw, th)
}
