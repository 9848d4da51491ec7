//! Goal domain model.
//!
//! A goal is a named conjunction of conditions over the world state.

use serde::{Deserialize, Serialize};

use super::action::Condition;
use super::world_state::WorldState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub conditions: Vec<Condition>,
}

impl Goal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn require(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_satisfied(&self, state: &WorldState) -> bool {
        self.conditions.iter().all(|c| c.is_satisfied(state))
    }

    pub fn unsatisfied<'a>(
        &'a self,
        state: &'a WorldState,
    ) -> impl Iterator<Item = &'a Condition> + 'a {
        self.conditions.iter().filter(move |c| !c.is_satisfied(state))
    }
}
