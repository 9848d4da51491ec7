//! Planning actions: preconditions, effects and cost.
//!
//! Actions are data, not closures, so a catalog can be loaded from YAML,
//! hashed, logged and compared. Applying an action never mutates its input.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::task::DomainId;
use super::world_state::{Environment, Metric, WorldState};
use crate::domain::errors::CatalogError;

/// A predicate over a [`WorldState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    AtLeast { metric: Metric, value: f64 },
    AtMost { metric: Metric, value: f64 },
    Flag { name: String, value: bool },
    AgentAvailable { agent_type: String },
    AgentsAtLeast { count: usize },
    PatternKnown { pattern: String },
    Environment { environment: Environment },
}

impl Condition {
    pub const fn at_least(metric: Metric, value: f64) -> Self {
        Self::AtLeast { metric, value }
    }

    pub const fn at_most(metric: Metric, value: f64) -> Self {
        Self::AtMost { metric, value }
    }

    pub fn flag(name: impl Into<String>, value: bool) -> Self {
        Self::Flag {
            name: name.into(),
            value,
        }
    }

    pub fn agent(agent_type: impl Into<String>) -> Self {
        Self::AgentAvailable {
            agent_type: agent_type.into(),
        }
    }

    pub fn is_satisfied(&self, state: &WorldState) -> bool {
        match self {
            Self::AtLeast { metric, value } => state.metric(*metric) >= *value,
            Self::AtMost { metric, value } => state.metric(*metric) <= *value,
            Self::Flag { name, value } => state.flag(name) == *value,
            Self::AgentAvailable { agent_type } => state.has_agent(agent_type),
            Self::AgentsAtLeast { count } => state.fleet.available_agents.len() >= *count,
            Self::PatternKnown { pattern } => state.knows_pattern(pattern),
            Self::Environment { environment } => state.context.environment == *environment,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast { metric, value } => write!(f, "{metric} >= {value}"),
            Self::AtMost { metric, value } => write!(f, "{metric} <= {value}"),
            Self::Flag { name, value } => write!(f, "{name} == {value}"),
            Self::AgentAvailable { agent_type } => write!(f, "agent '{agent_type}' available"),
            Self::AgentsAtLeast { count } => write!(f, "at least {count} agents available"),
            Self::PatternKnown { pattern } => write!(f, "pattern '{pattern}' known"),
            Self::Environment { environment } => {
                write!(f, "environment == {}", environment.as_str())
            }
        }
    }
}

/// A state transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Add { metric: Metric, delta: f64 },
    Set { metric: Metric, value: f64 },
    SetFlag { name: String, value: bool },
    AddAgent { agent_type: String },
    RemoveAgent { agent_type: String },
    LearnPattern { pattern: String },
}

impl Effect {
    pub const fn add(metric: Metric, delta: f64) -> Self {
        Self::Add { metric, delta }
    }

    pub const fn set(metric: Metric, value: f64) -> Self {
        Self::Set { metric, value }
    }

    pub fn set_flag(name: impl Into<String>, value: bool) -> Self {
        Self::SetFlag {
            name: name.into(),
            value,
        }
    }

    pub fn apply(&self, state: &mut WorldState) {
        match self {
            Self::Add { metric, delta } => {
                let current = state.metric(*metric);
                state.set_metric(*metric, current + delta);
            }
            Self::Set { metric, value } => state.set_metric(*metric, *value),
            Self::SetFlag { name, value } => state.set_flag(name.clone(), *value),
            Self::AddAgent { agent_type } => state.add_agent(agent_type.clone()),
            Self::RemoveAgent { agent_type } => {
                state.remove_agent(agent_type);
            }
            Self::LearnPattern { pattern } => state.learn_pattern(pattern.clone()),
        }
    }

    /// Whether applying this effect could turn `condition` from false to true.
    ///
    /// Over-approximates: the planner's heuristic only needs to never miss an
    /// effect that can satisfy a condition.
    pub fn may_satisfy(&self, condition: &Condition) -> bool {
        match (self, condition) {
            (Self::Add { metric, delta }, Condition::AtLeast { metric: m, .. }) => {
                metric == m && *delta > 0.0
            }
            (Self::Add { metric, delta }, Condition::AtMost { metric: m, .. }) => {
                metric == m && *delta < 0.0
            }
            (Self::Set { metric, value }, Condition::AtLeast { metric: m, value: t }) => {
                metric == m && metric.stored_value(*value) >= *t
            }
            (Self::Set { metric, value }, Condition::AtMost { metric: m, value: t }) => {
                metric == m && metric.stored_value(*value) <= *t
            }
            (Self::SetFlag { name, value }, Condition::Flag { name: n, value: v }) => {
                name == n && value == v
            }
            (Self::AddAgent { agent_type }, Condition::AgentAvailable { agent_type: t }) => {
                agent_type == t
            }
            (Self::AddAgent { .. }, Condition::AgentsAtLeast { .. }) => true,
            (Self::LearnPattern { pattern }, Condition::PatternKnown { pattern: p }) => {
                pattern == p
            }
            _ => false,
        }
    }
}

/// A unit of work the planner can schedule: preconditions → effects, at a cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    /// Domain whose handler performs the real work for this step.
    pub domain: DomainId,
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    pub cost: f64,
    /// Opaque data forwarded to the domain handler.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Action {
    pub fn new(name: impl Into<String>, domain: impl Into<DomainId>, cost: f64) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            preconditions: Vec::new(),
            effects: Vec::new(),
            cost,
            payload: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn requires(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    #[must_use]
    pub fn produces(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_applicable(&self, state: &WorldState) -> bool {
        self.preconditions.iter().all(|c| c.is_satisfied(state))
    }

    /// Human-readable list of preconditions that do not hold in `state`.
    pub fn unmet_preconditions(&self, state: &WorldState) -> Vec<String> {
        self.preconditions
            .iter()
            .filter(|c| !c.is_satisfied(state))
            .map(ToString::to_string)
            .collect()
    }

    /// Apply every effect in order to `state`.
    pub fn apply_to(&self, state: &mut WorldState) {
        for effect in &self.effects {
            effect.apply(state);
        }
    }

    /// Return the successor state, leaving `state` untouched.
    pub fn apply(&self, state: &WorldState) -> WorldState {
        let mut next = state.clone();
        self.apply_to(&mut next);
        next
    }

    fn may_satisfy(&self, condition: &Condition) -> bool {
        self.effects.iter().any(|e| e.may_satisfy(condition))
    }
}

/// Validated set of actions available to the planner, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: Vec<Action>,
}

impl ActionCatalog {
    pub fn new(actions: Vec<Action>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for action in &actions {
            if action.name.trim().is_empty() {
                return Err(CatalogError::InvalidAction {
                    action: action.name.clone(),
                    reason: "name cannot be empty".to_string(),
                });
            }
            if !action.cost.is_finite() || action.cost < 0.0 {
                return Err(CatalogError::InvalidAction {
                    action: action.name.clone(),
                    reason: format!("cost must be finite and non-negative, got {}", action.cost),
                });
            }
            if !seen.insert(action.name.clone()) {
                return Err(CatalogError::DuplicateAction(action.name.clone()));
            }
        }

        let mut actions = actions;
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { actions })
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions
            .binary_search_by(|a| a.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.actions[i])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Copy of this catalog with the given per-action costs substituted.
    ///
    /// Unknown names are ignored; invalid costs keep the declared cost.
    #[must_use]
    pub fn with_costs(&self, costs: &HashMap<String, f64>) -> Self {
        let actions = self
            .actions
            .iter()
            .map(|a| {
                let mut action = a.clone();
                if let Some(cost) = costs.get(&a.name) {
                    if cost.is_finite() && *cost >= 0.0 {
                        action.cost = *cost;
                    }
                }
                action
            })
            .collect();
        Self { actions }
    }

    /// Cheapest cost of any action that could satisfy `condition`.
    pub fn cheapest_for(&self, condition: &Condition) -> Option<f64> {
        self.actions
            .iter()
            .filter(|a| a.may_satisfy(condition))
            .map(|a| a.cost)
            .min_by(f64::total_cmp)
    }

    /// Actions grouped by owning domain, for diagnostics.
    pub fn by_domain(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for action in &self.actions {
            grouped
                .entry(action.domain.as_str())
                .or_default()
                .push(action.name.as_str());
        }
        grouped
    }
}
