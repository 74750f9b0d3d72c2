//! smokestore core library
//!
//! Artifact storage and checkpoint validation for browser smoke tests:
//! chunked DOM snapshots, screenshots with visual diffing, console logs,
//! and checkpoints tying them together. Callers work with lightweight
//! [`StorageRef`]s and read artifact bodies only when they need them.

pub mod assertion;
pub mod checkpoint;
pub mod config;
pub mod console;
pub mod content;
pub mod dom;
pub mod error;
pub mod filter;
pub mod manager;
pub mod screenshot;
pub mod types;

// Re-export commonly used types
pub use assertion::{
    AssertionEngine, AssertionKind, AssertionResult, ConsoleSource, ConsoleValidationSpec, DomSource,
    DomValidationSpec,
};
pub use checkpoint::{CheckpointMetadata, CheckpointQuery, CheckpointState, CheckpointStore};
pub use config::StorageConfig;
pub use console::{ConsoleLevel, ConsoleLogEntry, ConsoleQuery, ConsoleStore, ConsoleSummary};
pub use content::ContentStore;
pub use dom::{DomNode, DomStats, DomStore};
pub use error::{Error, Result};
pub use filter::{ErrorFilter, MatchMode};
pub use manager::{
    CaptureRequest, CheckpointComparison, CheckpointUpdate, DeleteOptions, LoadedCheckpoint, StorageManager,
    StorageStats,
};
pub use screenshot::{CompareOptions, DiffResult, ScreenshotMetadata, ScreenshotStore};
pub use types::*;

/// smokestore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".smokestore")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_store_path().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
