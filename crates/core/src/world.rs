//! World adapter trait: supplies state snapshots for tick prompts.

use async_trait::async_trait;

use crate::error::WorldError;

/// Source of world-state snapshots.
///
/// The snapshot format belongs to the embedding application; the scheduler
/// only hands it to a tick prompt formatter.
#[async_trait]
pub trait WorldAdapter: Send + Sync {
    /// Fetch the latest world state.
    async fn world_state(&self) -> Result<serde_json::Value, WorldError>;
}
