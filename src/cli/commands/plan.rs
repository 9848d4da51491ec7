//! Implementation of the `fleetcore plan` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::adapters::memory::SharedWorldState;
use crate::adapters::SimulatedHandler;
use crate::application::TaskCoordinator;
use crate::cli::models::Scenario;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::action::ActionCatalog;
use crate::domain::models::config::Config;
use crate::domain::models::event::event_types;
use crate::domain::models::plan::Plan;
use crate::domain::models::task::{TaskRequest, TaskStatus};
use crate::domain::ports::StateSource;
use crate::services::{EventBus, GoalPlanner, HandlerRegistry};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Scenario file with `state`, `goal` and `actions`
    pub scenario: PathBuf,

    /// Run the plan through the coordinator with simulated domain handlers
    #[arg(long)]
    pub execute: bool,

    /// Delay of each simulated step in milliseconds
    #[arg(long, default_value_t = 0)]
    pub step_delay_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PlanStepView {
    pub index: usize,
    pub action: String,
    pub domain: String,
    pub cost: f64,
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    pub goal: String,
    pub steps: Vec<PlanStepView>,
    pub total_cost: f64,
    pub expanded_nodes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionSummary {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub report: Option<serde_json::Value>,
}

impl From<&Plan> for PlanOutput {
    fn from(plan: &Plan) -> Self {
        Self {
            goal: plan.goal().name.clone(),
            steps: plan
                .steps()
                .iter()
                .enumerate()
                .map(|(index, action)| PlanStepView {
                    index: index + 1,
                    action: action.name.clone(),
                    domain: action.domain.to_string(),
                    cost: action.cost,
                })
                .collect(),
            total_cost: plan.total_cost(),
            expanded_nodes: plan.expanded_nodes(),
            execution: None,
        }
    }
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        if self.steps.is_empty() {
            return format!("Goal '{}' is already satisfied; nothing to do.", self.goal);
        }

        let mut steps = table(["#", "Action", "Domain", "Cost"]);
        for step in &self.steps {
            steps.add_row(vec![
                step.index.to_string(),
                step.action.clone(),
                step.domain.clone(),
                format!("{:.2}", step.cost),
            ]);
        }

        let mut lines = vec![
            format!("Plan for goal '{}'", self.goal),
            steps.to_string(),
            format!(
                "Total cost {:.2}, {} nodes expanded",
                self.total_cost, self.expanded_nodes
            ),
        ];
        if let Some(execution) = &self.execution {
            lines.push(format!("\nExecution {}: {}", execution.task_id, execution.status));
            if let Some(error) = &execution.error {
                lines.push(format!("Error: {error}"));
            }
        }
        lines.join("\n")
    }
}

pub async fn execute(args: &PlanArgs, config: &Config, json_mode: bool) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let catalog = ActionCatalog::new(scenario.actions).context("Invalid action catalog")?;
    let plan = GoalPlanner::new(config.planner.clone())
        .plan(&scenario.state, &scenario.goal, &catalog)
        .context("Planning failed")?;

    let mut summary = PlanOutput::from(&plan);
    if args.execute {
        if let Some(first) = plan.steps().first() {
            let domain = first.domain.to_string();
            let state = Arc::new(SharedWorldState::new(scenario.state.clone()));
            summary.execution = Some(
                run_plan(
                    config,
                    catalog,
                    state,
                    TaskRequest::plan(domain, scenario.goal.clone()),
                    Duration::from_millis(args.step_delay_ms),
                )
                .await?,
            );
        }
    }

    output(&summary, json_mode);
    Ok(())
}

async fn run_plan(
    config: &Config,
    catalog: ActionCatalog,
    state: Arc<dyn StateSource>,
    request: TaskRequest,
    step_delay: Duration,
) -> Result<ExecutionSummary> {
    let handler = Arc::new(SimulatedHandler::new(step_delay));
    let handlers = catalog
        .by_domain()
        .into_keys()
        .fold(HandlerRegistry::builder(), |builder, domain| {
            builder.register(domain, handler.clone())
        })
        .build();

    let bus = EventBus::new(&config.event_bus);
    let coordinator = TaskCoordinator::builder(config, handlers, Arc::new(bus.clone()))
        .planning(catalog, state)
        .build();

    let mut events = bus.stream();
    let handle = coordinator.submit_task(request)?;
    loop {
        match events.recv().await {
            Ok(event)
                if event.task_id == Some(handle.task_id)
                    && matches!(
                        event.event_type.as_str(),
                        event_types::TASK_COMPLETED | event_types::TASK_FAILED | event_types::TASK_CANCELLED
                    ) =>
            {
                break;
            }
            Err(RecvError::Lagged(_)) => {
                let finished = coordinator
                    .get_task(handle.task_id)
                    .is_some_and(|t| t.status.is_terminal());
                if finished {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Closed) => bail!("Event stream closed before the plan finished"),
        }
    }

    let task = coordinator
        .get_task(handle.task_id)
        .context("Finished task missing from history")?;
    Ok(ExecutionSummary {
        task_id: task.id,
        status: task.status,
        error: task.error,
        report: task.output.map(|o| o.data),
    })
}
