//! Console Commands

use anyhow::{anyhow, Result};
use clap::Subcommand;

use smokestore_core::{ConsoleLevel, ConsoleQuery, MatchMode, StorageManager, StorageRef};

use super::resolve_state;
use crate::output::{print_item, print_list, OutputFormat};

#[derive(Subcommand)]
pub enum ConsoleCommands {
    /// Level counts, unique messages and error categories
    Summary {
        checkpoint: String,

        /// Skip error categorization
        #[arg(long)]
        no_categories: bool,
    },

    /// Print entries matching levels and patterns
    Query {
        checkpoint: String,

        /// Level to include (log, info, warn, error, debug); repeatable
        #[arg(short, long = "level")]
        levels: Vec<ConsoleLevel>,

        /// Message pattern; repeatable, any match selects the entry
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,

        /// How patterns are matched
        #[arg(long, value_enum, default_value = "contains")]
        mode: Mode,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Mode {
    Exact,
    Contains,
    Regex,
}

impl From<Mode> for MatchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Exact => MatchMode::Exact,
            Mode::Contains => MatchMode::Contains,
            Mode::Regex => MatchMode::Regex,
        }
    }
}

async fn console_ref(manager: &StorageManager, checkpoint: &str) -> Result<StorageRef> {
    let (_, state) = resolve_state(manager, checkpoint).await?;
    state
        .console_ref
        .ok_or_else(|| anyhow!("checkpoint '{}' has no console log", checkpoint))
}

pub async fn execute(cmd: ConsoleCommands, manager: &StorageManager, format: OutputFormat) -> Result<()> {
    match cmd {
        ConsoleCommands::Summary {
            checkpoint,
            no_categories,
        } => {
            let r = console_ref(manager, &checkpoint).await?;
            print_item(&manager.console().summary(&r, !no_categories).await?, format)?;
        }

        ConsoleCommands::Query {
            checkpoint,
            levels,
            patterns,
            mode,
        } => {
            let r = console_ref(manager, &checkpoint).await?;
            let query = ConsoleQuery {
                levels,
                patterns,
                mode: mode.into(),
            };
            print_list(&manager.console().query(&r, &query).await?, format)?;
        }
    }

    Ok(())
}
