//! Output formatting for CLI

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Indented JSON
    #[default]
    Json,
    /// One JSON document per line
    Compact,
}

/// Print a single item
pub fn print_item<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(item)?,
        OutputFormat::Compact => serde_json::to_string(item)?,
    };
    println!("{}", rendered);
    Ok(())
}

/// Print a list of items
pub fn print_list<T: Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_item(items, format),
        OutputFormat::Compact => {
            for item in items {
                print_item(item, format)?;
            }
            Ok(())
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    eprintln!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}
