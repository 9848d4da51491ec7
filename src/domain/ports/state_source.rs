use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::action::Effect;
use crate::domain::models::world_state::WorldState;

/// Port for the live world state a plan executes against
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Current state, as an owned copy.
    async fn snapshot(&self) -> Result<WorldState>;

    /// Apply the effects of a completed step to the live state.
    async fn apply(&self, effects: &[Effect]) -> Result<()>;
}
