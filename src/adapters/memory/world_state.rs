use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::models::action::Effect;
use crate::domain::models::world_state::WorldState;
use crate::domain::ports::StateSource;

/// Live world state shared between the coordinator and domain reporters.
#[derive(Debug, Default)]
pub struct SharedWorldState {
    state: RwLock<WorldState>,
}

impl SharedWorldState {
    pub fn new(state: WorldState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Replace the whole state, e.g. after a fresh measurement.
    pub async fn set(&self, state: WorldState) {
        *self.state.write().await = state;
    }

    /// Mutate the state in place.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut WorldState) + Send,
    {
        f(&mut *self.state.write().await);
    }
}

#[async_trait]
impl StateSource for SharedWorldState {
    async fn snapshot(&self) -> Result<WorldState> {
        Ok(self.state.read().await.clone())
    }

    async fn apply(&self, effects: &[Effect]) -> Result<()> {
        let mut state = self.state.write().await;
        for effect in effects {
            effect.apply(&mut state);
        }
        Ok(())
    }
}
