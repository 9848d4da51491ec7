//! Input files read by CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::models::action::Action;
use crate::domain::models::goal::Goal;
use crate::domain::models::world_state::WorldState;

/// A planning problem: start state, goal and available actions.
///
/// Read from YAML; JSON files parse too since YAML is a superset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub state: WorldState,
    pub goal: Goal,
    pub actions: Vec<Action>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}
