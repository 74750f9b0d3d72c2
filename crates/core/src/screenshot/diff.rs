//! Pixel comparison with tolerance and region masks

use image::{Pixel, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::types::{Region, StorageRef};

/// Options for a screenshot comparison
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Per-pixel tolerance (0.0 - 1.0); store default when unset
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Restrict the comparison to these rectangles
    #[serde(default)]
    pub regions: Vec<Region>,
    /// Rectangles excluded from counting
    #[serde(default)]
    pub ignore_regions: Vec<Region>,
    /// Store a highlighted difference image
    #[serde(default)]
    pub generate_diff_image: bool,
}

/// Per-region outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDiff {
    pub region: Region,
    pub different_pixels: u64,
    pub total_pixels: u64,
}

/// Result of a visual comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    /// Percentage of compared pixels that differ (0.0 - 100.0)
    pub diff_percentage: f64,
    pub different_pixels: u64,
    pub total_pixels: u64,
    /// Images had different sizes; reported as a full difference
    pub dimension_mismatch: bool,
    /// Highlighted difference image, if requested and anything differed
    pub diff_image: Option<StorageRef>,
    pub regions: Vec<RegionDiff>,
}

impl DiffResult {
    pub(crate) fn from_regions(regions: Vec<RegionDiff>) -> Self {
        let different_pixels = regions.iter().map(|r| r.different_pixels).sum();
        let total_pixels = regions.iter().map(|r| r.total_pixels).sum();
        Self {
            diff_percentage: percentage(different_pixels, total_pixels),
            different_pixels,
            total_pixels,
            dimension_mismatch: false,
            diff_image: None,
            regions,
        }
    }

    pub(crate) fn dimension_mismatch(a: (u32, u32), b: (u32, u32)) -> Self {
        let total = (a.0 as u64 * a.1 as u64).max(b.0 as u64 * b.1 as u64);
        Self {
            diff_percentage: 100.0,
            different_pixels: total,
            total_pixels: total,
            dimension_mismatch: true,
            diff_image: None,
            regions: Vec::new(),
        }
    }

    /// Whether the difference stays within `threshold` percent
    pub fn within(&self, threshold: f64) -> bool {
        self.diff_percentage <= threshold
    }
}

fn percentage(different: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (different as f64 / total as f64) * 100.0
    }
}

/// Normalized RGBA distance in [0, 1]
pub fn pixel_distance(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    let sum: f64 = a
        .channels()
        .iter()
        .zip(b.channels())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    // Max distance over four channels is sqrt(4 * 255^2) = 510.
    sum.sqrt() / 510.0
}

/// Visit every compared pixel, region by region.
///
/// `differs` is asked once per pixel that is inside a compared region and
/// outside every ignore region.
pub(crate) fn walk_regions(
    width: u32,
    height: u32,
    regions: &[Region],
    ignore: &[Region],
    mut differs: impl FnMut(u32, u32) -> bool,
) -> Vec<RegionDiff> {
    let targets: Vec<Region> = if regions.is_empty() {
        vec![Region::new(0, 0, width, height)]
    } else {
        regions.to_vec()
    };

    targets
        .into_iter()
        .map(|region| {
            let mut result = RegionDiff {
                region,
                different_pixels: 0,
                total_pixels: 0,
            };
            let Some(clipped) = region.clip(width, height) else {
                return result;
            };
            for y in clipped.y..clipped.y + clipped.height {
                for x in clipped.x..clipped.x + clipped.width {
                    if ignore.iter().any(|r| r.contains(x, y)) {
                        continue;
                    }
                    result.total_pixels += 1;
                    if differs(x, y) {
                        result.different_pixels += 1;
                    }
                }
            }
            result
        })
        .collect()
}

/// Compare two same-sized images.
///
/// Returns the per-region counts and, when `highlight` is set, an image with
/// differing pixels in red and everything else dimmed.
pub fn diff_images(
    a: &RgbaImage,
    b: &RgbaImage,
    tolerance: f64,
    regions: &[Region],
    ignore: &[Region],
    highlight: bool,
) -> (Vec<RegionDiff>, Option<RgbaImage>) {
    let (width, height) = a.dimensions();
    let mut diff_img = highlight.then(|| {
        let mut img = RgbaImage::new(width, height);
        for (x, y, pixel) in a.enumerate_pixels() {
            let c = pixel.channels();
            img.put_pixel(x, y, Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
        }
        img
    });

    let regions = walk_regions(width, height, regions, ignore, |x, y| {
        let differs = pixel_distance(a.get_pixel(x, y), b.get_pixel(x, y)) > tolerance;
        if differs {
            if let Some(img) = diff_img.as_mut() {
                img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        differs
    });

    (regions, diff_img)
}
