//! smokestore CLI
//!
//! Read-mostly inspection of a smokestore directory: checkpoints, DOM
//! queries, screenshot diffs and console summaries, printed as JSON.

pub mod commands;
pub mod output;
