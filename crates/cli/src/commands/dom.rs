//! DOM Commands

use anyhow::{anyhow, Result};
use clap::Subcommand;
use serde::Serialize;

use smokestore_core::dom::QueryStats;
use smokestore_core::{DomNode, DomStats, StorageManager, StorageRef};

use super::resolve_state;
use crate::output::{print_item, OutputFormat};

#[derive(Subcommand)]
pub enum DomCommands {
    /// Run a selector against a checkpoint's DOM snapshot
    Query {
        /// Checkpoint name
        checkpoint: String,

        /// Selector list of compound selectors, e.g. `a.cta, #main`
        selector: String,

        /// Maximum number of nodes printed
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Node and chunk counts of a checkpoint's DOM snapshot
    Stats { checkpoint: String },
}

#[derive(Serialize)]
struct QueryOutput {
    selector: String,
    stats: QueryStats,
    nodes: Vec<DomNode>,
}

async fn dom_ref(manager: &StorageManager, checkpoint: &str) -> Result<StorageRef> {
    let (_, state) = resolve_state(manager, checkpoint).await?;
    state
        .dom_ref
        .ok_or_else(|| anyhow!("checkpoint '{}' has no DOM snapshot", checkpoint))
}

pub async fn execute(cmd: DomCommands, manager: &StorageManager, format: OutputFormat) -> Result<()> {
    match cmd {
        DomCommands::Query {
            checkpoint,
            selector,
            limit,
        } => {
            let r = dom_ref(manager, &checkpoint).await?;
            let (mut nodes, stats) = manager.dom().query_with_stats(&r, &selector).await?;
            if let Some(limit) = limit {
                nodes.truncate(limit);
            }
            print_item(&QueryOutput { selector, stats, nodes }, format)?;
        }

        DomCommands::Stats { checkpoint } => {
            let r = dom_ref(manager, &checkpoint).await?;
            let stats: DomStats = manager.dom().get_stats(&r).await?;
            print_item(&stats, format)?;
        }
    }

    Ok(())
}
