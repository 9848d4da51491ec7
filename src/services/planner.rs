//! Goal-oriented action planner.
//!
//! A* search over world states. The open set is a binary min-heap ordered by
//! `f = g + h`, with ties broken on lower `h` and then on action name. The
//! closed set maps each canonical state key to the cheapest `g` seen for it;
//! a successor is only pushed when it strictly improves on that entry.
//!
//! The heuristic is the maximum, over unsatisfied goal conditions, of the
//! cheapest action able to satisfy that condition. Any step that flips a
//! condition to true must be such an action, so the estimate never exceeds
//! the true remaining cost and drops by at most the cost of each step.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, instrument};

use crate::domain::errors::{PlanningError, PlanningResult};
use crate::domain::models::action::ActionCatalog;
use crate::domain::models::config::PlannerConfig;
use crate::domain::models::goal::Goal;
use crate::domain::models::plan::Plan;
use crate::domain::models::world_state::{StateKey, WorldState};

struct PlanNode {
    state: WorldState,
    key: StateKey,
    g: f64,
    /// Index into the catalog of the action that produced this node.
    action: Option<usize>,
    parent: Option<usize>,
}

/// Open-set entry. Ordered so that `BinaryHeap` pops the best node first.
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    h: f64,
    g: f64,
    /// Catalog index; the catalog is sorted by name, so this orders lexically.
    action: Option<usize>,
    node: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.action.cmp(&self.action))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// A* planner with an explicit expansion bound.
#[derive(Debug, Clone, Default)]
pub struct GoalPlanner {
    config: PlannerConfig,
}

impl GoalPlanner {
    pub const fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub const fn max_iterations(&self) -> usize {
        self.config.max_plan_iterations
    }

    /// Find a minimum-cost plan from `current` to `goal` using `catalog`.
    ///
    /// Pure: works on its own copies of the state. A goal that already holds
    /// yields an empty plan with zero cost.
    ///
    /// # Errors
    /// - [`PlanningError::NoPlanFound`] when the reachable space is exhausted
    /// - [`PlanningError::IterationCapExceeded`] after `max_plan_iterations`
    ///   node expansions
    #[instrument(skip_all, fields(goal = %goal.name, actions = catalog.len()))]
    pub fn plan(
        &self,
        current: &WorldState,
        goal: &Goal,
        catalog: &ActionCatalog,
    ) -> PlanningResult<Plan> {
        let cap = self.config.max_plan_iterations;
        let no_plan = |expanded| PlanningError::NoPlanFound {
            goal: goal.name.clone(),
            expanded,
        };

        let Some(h0) = heuristic(current, goal, catalog) else {
            debug!("Goal has a condition no action can satisfy");
            return Err(no_plan(0));
        };

        let root_key = current.canonical_key();
        let mut best_g: HashMap<StateKey, f64> = HashMap::new();
        best_g.insert(root_key.clone(), 0.0);

        let mut arena = vec![PlanNode {
            state: current.clone(),
            key: root_key,
            g: 0.0,
            action: None,
            parent: None,
        }];
        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            f: h0,
            h: h0,
            g: 0.0,
            action: None,
            node: 0,
        });

        let mut expanded = 0usize;
        while let Some(entry) = open.pop() {
            let node = &arena[entry.node];
            if best_g.get(&node.key).is_some_and(|best| *best < entry.g) {
                // Superseded by a cheaper path to the same state.
                continue;
            }

            if goal.is_satisfied(&node.state) {
                let plan = reconstruct(&arena, entry.node, goal, catalog, expanded);
                debug!(
                    steps = plan.len(),
                    cost = plan.total_cost(),
                    expanded,
                    "Plan found"
                );
                return Ok(plan);
            }

            if expanded >= cap {
                debug!(expanded, cap, "Planner hit the iteration cap");
                return Err(PlanningError::IterationCapExceeded {
                    goal: goal.name.clone(),
                    cap,
                });
            }
            expanded += 1;

            let parent_g = node.g;
            let parent_state = node.state.clone();
            for (index, action) in catalog.actions().iter().enumerate() {
                if !action.is_applicable(&parent_state) {
                    continue;
                }
                let next = action.apply(&parent_state);
                let g = parent_g + action.cost;
                let key = next.canonical_key();

                if best_g.get(&key).is_some_and(|best| *best <= g) {
                    continue;
                }
                let Some(h) = heuristic(&next, goal, catalog) else {
                    continue;
                };
                best_g.insert(key.clone(), g);

                let node_index = arena.len();
                arena.push(PlanNode {
                    state: next,
                    key,
                    g,
                    action: Some(index),
                    parent: Some(entry.node),
                });
                open.push(OpenEntry {
                    f: g + h,
                    h,
                    g,
                    action: Some(index),
                    node: node_index,
                });
            }
        }

        debug!(expanded, "Open set exhausted");
        Err(no_plan(expanded))
    }
}

/// Admissible, consistent estimate of the remaining cost; `None` marks a dead end.
fn heuristic(state: &WorldState, goal: &Goal, catalog: &ActionCatalog) -> Option<f64> {
    let mut estimate = 0.0f64;
    for condition in goal.unsatisfied(state) {
        let cheapest = catalog.cheapest_for(condition)?;
        estimate = estimate.max(cheapest);
    }
    Some(estimate)
}

fn reconstruct(
    arena: &[PlanNode],
    goal_node: usize,
    goal: &Goal,
    catalog: &ActionCatalog,
    expanded: usize,
) -> Plan {
    let mut steps = Vec::new();
    let mut cursor = Some(goal_node);
    while let Some(index) = cursor {
        let node = &arena[index];
        if let Some(action) = node.action {
            steps.push(catalog.actions()[action].clone());
        }
        cursor = node.parent;
    }
    steps.reverse();
    Plan::new(goal.clone(), steps, expanded)
}
