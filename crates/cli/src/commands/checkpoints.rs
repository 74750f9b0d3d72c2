//! Checkpoint Commands

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use std::collections::BTreeMap;

use smokestore_core::{CheckpointQuery, DeleteOptions, StorageManager, StorageRef};

use super::{resolve, resolve_state};
use crate::output::{print_item, print_list, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// List checkpoints, newest first
    List {
        /// Only checkpoints captured at this URL
        #[arg(long)]
        url: Option<String>,

        /// Required user tag (key=value), repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Captured at or after (RFC 3339)
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Captured at or before (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Filter on screenshot presence
        #[arg(long)]
        has_screenshot: Option<bool>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Checkpoints captured at a URL, newest first
    History {
        url: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a checkpoint record
    Show {
        /// Checkpoint name (most recent wins)
        name: String,
    },

    /// Compare the artifacts of two checkpoints
    Compare { a: String, b: String },

    /// Delete a checkpoint
    Delete {
        name: String,

        /// Also delete artifacts no other checkpoint references
        #[arg(long)]
        cascade: bool,
    },
}

/// Checkpoint listing row
#[derive(Serialize)]
pub struct CheckpointDisplay {
    pub name: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub has_dom: bool,
    pub has_screenshot: bool,
    pub has_console: bool,
    pub path: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl From<StorageRef> for CheckpointDisplay {
    fn from(r: StorageRef) -> Self {
        Self {
            name: r.tags.name.unwrap_or_default(),
            url: r.tags.url.unwrap_or_default(),
            timestamp: r.timestamp,
            has_dom: r.tags.has_dom.unwrap_or(false),
            has_screenshot: r.tags.has_screenshot.unwrap_or(false),
            has_console: r.tags.has_console.unwrap_or(false),
            path: r.path,
            tags: r.tags.extra,
        }
    }
}

fn parse_tag(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{}'", raw))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn print_refs(refs: Vec<StorageRef>, format: OutputFormat) -> Result<()> {
    let rows: Vec<CheckpointDisplay> = refs.into_iter().map(CheckpointDisplay::from).collect();
    print_list(&rows, format)
}

pub async fn execute(cmd: CheckpointCommands, manager: &StorageManager, format: OutputFormat) -> Result<()> {
    match cmd {
        CheckpointCommands::List {
            url,
            tags,
            since,
            until,
            has_screenshot,
            limit,
        } => {
            let query = CheckpointQuery {
                url,
                tags: tags.into_iter().collect(),
                start_time: since,
                end_time: until,
                has_screenshot,
                limit,
                ..Default::default()
            };
            print_refs(manager.query_checkpoints(&query).await?, format)?;
        }

        CheckpointCommands::History { url, limit } => {
            print_refs(manager.get_checkpoint_history(&url, limit).await?, format)?;
        }

        CheckpointCommands::Show { name } => {
            let (_, state) = resolve_state(manager, &name).await?;
            print_item(&state, format)?;
        }

        CheckpointCommands::Compare { a, b } => {
            let (ref_a, ref_b) = (resolve(manager, &a).await?, resolve(manager, &b).await?);
            print_item(&manager.compare_checkpoints(&ref_a, &ref_b).await?, format)?;
        }

        CheckpointCommands::Delete { name, cascade } => {
            let r = resolve(manager, &name).await?;
            manager
                .delete_checkpoint(
                    &r,
                    DeleteOptions {
                        delete_related_data: cascade,
                    },
                )
                .await?;
            print_success(&format!("Deleted checkpoint '{}'", name));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag("env=ci").unwrap(), ("env".to_string(), "ci".to_string()));
        assert_eq!(parse_tag("a=b=c").unwrap().1, "b=c");
        assert!(parse_tag("novalue").is_err());
    }
}
