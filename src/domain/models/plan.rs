//! Plan domain model.
//!
//! A plan is produced once by the planner and consumed once by the executor.
//! It is immutable after construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::goal::Goal;
use super::world_state::WorldState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    goal: Goal,
    steps: Vec<Action>,
    total_cost: f64,
    expanded_nodes: usize,
}

/// First step of a plan whose preconditions fail during simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationFailure {
    pub step: usize,
    pub action: String,
    pub unmet: Vec<String>,
}

impl Plan {
    pub(crate) fn new(goal: Goal, steps: Vec<Action>, expanded_nodes: usize) -> Self {
        let total_cost = steps.iter().map(|a| a.cost).sum();
        Self {
            goal,
            steps,
            total_cost,
            expanded_nodes,
        }
    }

    pub const fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn steps(&self) -> &[Action] {
        &self.steps
    }

    pub const fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Search nodes expanded while producing this plan.
    pub const fn expanded_nodes(&self) -> usize {
        self.expanded_nodes
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.steps.iter().map(|a| a.name.as_str()).collect()
    }

    /// Replay the plan's effects from `start`, checking preconditions at each step.
    pub fn simulate(&self, start: &WorldState) -> Result<WorldState, SimulationFailure> {
        let mut state = start.clone();
        for (step, action) in self.steps.iter().enumerate() {
            let unmet = action.unmet_preconditions(&state);
            if !unmet.is_empty() {
                return Err(SimulationFailure {
                    step,
                    action: action.name.clone(),
                    unmet,
                });
            }
            action.apply_to(&mut state);
        }
        Ok(state)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plan for '{}' ({} steps, cost {}): {}",
            self.goal.name,
            self.steps.len(),
            self.total_cost,
            self.action_names().join(" -> ")
        )
    }
}
