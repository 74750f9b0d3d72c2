//! CLI Commands

pub mod checkpoints;
pub mod console;
pub mod dom;
pub mod screenshot;

use anyhow::{anyhow, Result};
use smokestore_core::{CheckpointState, StorageManager, StorageRef};

/// Most recent checkpoint with this name
pub async fn resolve(manager: &StorageManager, name: &str) -> Result<StorageRef> {
    manager
        .get_checkpoint_by_name(name)
        .await?
        .ok_or_else(|| anyhow!("no checkpoint named '{}'", name))
}

/// Resolve a checkpoint by name and load its record
pub async fn resolve_state(manager: &StorageManager, name: &str) -> Result<(StorageRef, CheckpointState)> {
    let r = resolve(manager, name).await?;
    let state = manager.checkpoints().load(&r).await?;
    Ok((r, state))
}
