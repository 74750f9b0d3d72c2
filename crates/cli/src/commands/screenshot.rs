//! Screenshot Commands

use anyhow::{anyhow, Result};
use clap::Subcommand;
use std::path::PathBuf;
use tracing::info;

use smokestore_core::{CompareOptions, Region, StorageManager};

use super::{resolve, resolve_state};
use crate::output::{print_item, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ScreenshotCommands {
    /// Pixel comparison of two checkpoints' screenshots
    Diff {
        a: String,
        b: String,

        /// Per-pixel tolerance (0.0 - 1.0); store default when unset
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Region to ignore as x,y,width,height; repeatable
        #[arg(long = "ignore", value_parser = parse_region)]
        ignore_regions: Vec<Region>,

        /// Store a highlighted difference image
        #[arg(long)]
        diff_image: bool,
    },

    /// Header metadata of a checkpoint's screenshot
    Info { checkpoint: String },

    /// Write a checkpoint's screenshot thumbnail (JPEG) to a file
    Thumbnail { checkpoint: String, output: PathBuf },
}

fn parse_region(raw: &str) -> Result<Region> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| anyhow!("invalid region '{}': {}", raw, e))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(Region::new(*x, *y, *w, *h)),
        _ => Err(anyhow!("expected x,y,width,height, got '{}'", raw)),
    }
}

pub async fn execute(cmd: ScreenshotCommands, manager: &StorageManager, format: OutputFormat) -> Result<()> {
    match cmd {
        ScreenshotCommands::Diff {
            a,
            b,
            tolerance,
            ignore_regions,
            diff_image,
        } => {
            let (ref_a, ref_b) = (resolve(manager, &a).await?, resolve(manager, &b).await?);
            let options = CompareOptions {
                tolerance,
                ignore_regions,
                generate_diff_image: diff_image,
                ..Default::default()
            };
            let result = manager.compare_screenshots(&ref_a, &ref_b, &options).await?;
            print_item(&result, format)?;
        }

        ScreenshotCommands::Info { checkpoint } => {
            let (_, state) = resolve_state(manager, &checkpoint).await?;
            let r = state
                .screenshot_ref
                .ok_or_else(|| anyhow!("checkpoint '{}' has no screenshot", checkpoint))?;
            print_item(&manager.screenshots().metadata(&r).await?, format)?;
        }

        ScreenshotCommands::Thumbnail { checkpoint, output } => {
            let (_, state) = resolve_state(manager, &checkpoint).await?;
            let r = state
                .screenshot_ref
                .ok_or_else(|| anyhow!("checkpoint '{}' has no screenshot", checkpoint))?;
            let bytes = manager.screenshots().retrieve_thumbnail(&r).await?;
            tokio::fs::write(&output, &bytes).await?;
            info!("Wrote {} byte thumbnail", bytes.len());
            print_success(&format!("Thumbnail written to {}", output.display()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("0, 10, 200,50").unwrap(), Region::new(0, 10, 200, 50));
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }
}
