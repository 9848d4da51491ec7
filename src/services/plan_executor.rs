//! Plan executor service.
//!
//! Walks one plan sequentially. Before each step the action's preconditions
//! are re-checked against the live state, because it may have drifted since
//! planning. Successful steps apply their effects to a private working copy
//! and to the live state; failed steps go through the configured failure
//! policy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::cost_model::CostModel;
use super::handler_registry::{dispatch, HandlerRegistry};
use super::planner::GoalPlanner;
use crate::domain::errors::ExecutionError;
use crate::domain::models::action::{Action, ActionCatalog};
use crate::domain::models::config::{ExecutorConfig, FailurePolicy};
use crate::domain::models::event::LifecycleEvent;
use crate::domain::models::goal::Goal;
use crate::domain::models::plan::Plan;
use crate::domain::models::task::{DomainId, Task, TaskOutput, TaskRequest};
use crate::domain::models::world_state::WorldState;
use crate::domain::ports::{EventPublisher, StateSource};

/// Per-execution options.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub failure_policy: FailurePolicy,
    pub max_replans: u32,
    /// Record the working state before and after each successful step.
    pub snapshot_states: bool,
    /// Timeout applied to each step's dispatch.
    pub step_timeout: Duration,
    /// Checked between steps and passed (as a child token) to every handler.
    pub cancel: CancellationToken,
    /// Replacement goals; a change triggers a replan before the next step.
    pub goal_updates: Option<watch::Receiver<Option<Goal>>>,
    /// Owning coordinator task, used to correlate step dispatches and events.
    pub task_id: Option<Uuid>,
}

impl ExecutionOptions {
    pub fn from_config(config: &ExecutorConfig, step_timeout: Duration) -> Self {
        Self {
            failure_policy: config.failure_policy,
            max_replans: config.max_replans,
            snapshot_states: config.snapshot_states,
            step_timeout,
            cancel: CancellationToken::new(),
            goal_updates: None,
            task_id: None,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_goal_updates(mut self, updates: watch::Receiver<Option<Goal>>) -> Self {
        self.goal_updates = Some(updates);
        self
    }

    #[must_use]
    pub const fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default(), Duration::from_secs(300))
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Position across the whole execution, replans included.
    pub index: usize,
    pub action: String,
    pub domain: DomainId,
    pub status: StepStatus,
    pub error: Option<ExecutionError>,
    pub duration_ms: u64,
    pub output: Option<TaskOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<WorldState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<WorldState>,
}

/// Status of a plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every step succeeded.
    Completed,
    /// Ran to the end with some steps skipped after failure.
    PartialSuccess,
    /// Stopped early by the failure policy.
    Aborted,
    /// Stopped because the cancellation token fired.
    Cancelled,
}

/// What happened while executing a plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Goal in force when execution ended.
    pub goal: Goal,
    pub status: ExecutionStatus,
    pub steps: Vec<StepRecord>,
    pub replans: u32,
    pub goal_changes: u32,
    pub goal_satisfied: bool,
    /// The private working copy after the last applied step.
    pub final_state: WorldState,
    pub error: Option<ExecutionError>,
}

impl ExecutionReport {
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count()
    }

    /// Convert to a task result: success only when the run ended with the goal met.
    ///
    /// # Errors
    /// Returns the error that stopped execution, or `HandlerFailed` when the
    /// plan ran out of steps without satisfying the goal.
    pub fn into_output(self, domain: &DomainId) -> Result<TaskOutput, ExecutionError> {
        match self.status {
            ExecutionStatus::Cancelled => Err(self.error.unwrap_or(ExecutionError::Cancelled)),
            ExecutionStatus::Aborted => Err(self.error.unwrap_or_else(|| {
                ExecutionError::handler_failed(domain.as_str(), "plan execution aborted")
            })),
            ExecutionStatus::Completed | ExecutionStatus::PartialSuccess if self.goal_satisfied => {
                let message = format!(
                    "goal '{}' reached in {} steps",
                    self.goal.name,
                    self.completed_steps()
                );
                Ok(TaskOutput {
                    data: serde_json::to_value(&self).unwrap_or_default(),
                    message: Some(message),
                })
            }
            ExecutionStatus::Completed | ExecutionStatus::PartialSuccess => {
                Err(ExecutionError::handler_failed(
                    domain.as_str(),
                    format!("plan finished without satisfying goal '{}'", self.goal.name),
                ))
            }
        }
    }
}

/// Executes plans against a live state source.
#[derive(Clone)]
pub struct PlanExecutor {
    handlers: HandlerRegistry,
    planner: GoalPlanner,
    catalog: ActionCatalog,
    cost_model: Option<Arc<CostModel>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl PlanExecutor {
    pub fn new(handlers: HandlerRegistry, planner: GoalPlanner, catalog: ActionCatalog) -> Self {
        Self {
            handlers,
            planner,
            catalog,
            cost_model: None,
            events: None,
        }
    }

    /// Record step outcomes and use learned costs when replanning.
    #[must_use]
    pub fn with_cost_model(mut self, cost_model: Arc<CostModel>) -> Self {
        self.cost_model = Some(cost_model);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Execute `plan` step by step. Never fails; the outcome is in the report.
    #[instrument(skip_all, fields(goal = %plan.goal().name, steps = plan.len(), task_id = ?options.task_id))]
    pub async fn execute(
        &self,
        plan: Plan,
        live: &dyn StateSource,
        mut options: ExecutionOptions,
    ) -> ExecutionReport {
        let mut goal = plan.goal().clone();
        let mut pending: VecDeque<Action> = plan.steps().iter().cloned().collect();
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut replans = 0u32;
        let mut goal_changes = 0u32;

        let mut working = match live.snapshot().await {
            Ok(state) => state,
            Err(err) => {
                return ExecutionReport {
                    goal,
                    status: ExecutionStatus::Aborted,
                    steps,
                    replans,
                    goal_changes,
                    goal_satisfied: false,
                    final_state: WorldState::default(),
                    error: Some(state_error(&err)),
                };
            }
        };

        let (status, error) = loop {
            if options.cancel.is_cancelled() {
                break (ExecutionStatus::Cancelled, Some(ExecutionError::Cancelled));
            }

            if let Some(new_goal) = take_goal_update(&mut options.goal_updates) {
                info!(from = %goal.name, to = %new_goal.name, "Goal changed, replanning");
                goal = new_goal;
                goal_changes += 1;
                match self.replan(live, &goal).await {
                    Ok((next, state)) => {
                        working = state;
                        pending = next.steps().iter().cloned().collect();
                        self.emit(LifecycleEvent::PlanReplanned {
                            task_id: options.task_id,
                            reason: format!("goal changed to '{}'", goal.name),
                            replans,
                        });
                    }
                    Err(err) => break (ExecutionStatus::Aborted, Some(err)),
                }
            }

            let Some(action) = pending.pop_front() else {
                let status = if steps.iter().any(|s| s.status == StepStatus::Failed) {
                    ExecutionStatus::PartialSuccess
                } else {
                    ExecutionStatus::Completed
                };
                break (status, None);
            };

            let index = steps.len();
            let started = Instant::now();
            let outcome = match live.snapshot().await {
                Ok(live_state) => {
                    let unmet = action.unmet_preconditions(&live_state);
                    if unmet.is_empty() {
                        self.dispatch_step(&action, &options).await
                    } else {
                        Err(ExecutionError::PreconditionViolated {
                            action: action.name.clone(),
                            unmet,
                        })
                    }
                }
                Err(err) => Err(state_error(&err)),
            };
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match outcome {
                Ok(output) => {
                    let before = options.snapshot_states.then(|| working.clone());
                    action.apply_to(&mut working);
                    if let Err(err) = live.apply(&action.effects).await {
                        warn!(action = %action.name, error = %err, "Failed to push step effects to live state");
                    }
                    let after = options.snapshot_states.then(|| working.clone());

                    self.record_outcome(&action.name, true);
                    self.emit(LifecycleEvent::PlanStepCompleted {
                        task_id: options.task_id,
                        step: index,
                        action: action.name.clone(),
                        domain: action.domain.clone(),
                    });
                    debug!(step = index, action = %action.name, duration_ms, "Plan step completed");
                    steps.push(StepRecord {
                        index,
                        action: action.name.clone(),
                        domain: action.domain.clone(),
                        status: StepStatus::Completed,
                        error: None,
                        duration_ms,
                        output: Some(output),
                        before,
                        after,
                    });
                }
                Err(error) => {
                    let cancelled = matches!(error, ExecutionError::Cancelled);
                    if !cancelled {
                        self.record_outcome(&action.name, false);
                    }
                    self.emit(LifecycleEvent::PlanStepFailed {
                        task_id: options.task_id,
                        step: index,
                        action: action.name.clone(),
                        error: error.to_string(),
                    });
                    warn!(step = index, action = %action.name, error = %error, "Plan step failed");
                    steps.push(StepRecord {
                        index,
                        action: action.name.clone(),
                        domain: action.domain.clone(),
                        status: StepStatus::Failed,
                        error: Some(error.clone()),
                        duration_ms,
                        output: None,
                        before: None,
                        after: None,
                    });

                    if cancelled {
                        break (ExecutionStatus::Cancelled, Some(error));
                    }
                    match options.failure_policy {
                        FailurePolicy::Abort => break (ExecutionStatus::Aborted, Some(error)),
                        FailurePolicy::SkipAndContinue => {}
                        FailurePolicy::Replan => {
                            if replans >= options.max_replans {
                                warn!(replans, "Replan budget exhausted");
                                break (ExecutionStatus::Aborted, Some(error));
                            }
                            replans += 1;
                            match self.replan(live, &goal).await {
                                Ok((next, state)) => {
                                    working = state;
                                    pending = next.steps().iter().cloned().collect();
                                    self.emit(LifecycleEvent::PlanReplanned {
                                        task_id: options.task_id,
                                        reason: error.to_string(),
                                        replans,
                                    });
                                }
                                Err(err) => break (ExecutionStatus::Aborted, Some(err)),
                            }
                        }
                    }
                }
            }
        };

        self.persist_costs().await;

        ExecutionReport {
            goal_satisfied: goal.is_satisfied(&working),
            goal,
            status,
            steps,
            replans,
            goal_changes,
            final_state: working,
            error,
        }
    }

    async fn dispatch_step(
        &self,
        action: &Action,
        options: &ExecutionOptions,
    ) -> Result<TaskOutput, ExecutionError> {
        let handler = self.handlers.get(action.domain.as_str()).ok_or_else(|| {
            ExecutionError::handler_failed(action.domain.as_str(), "no handler registered for domain")
        })?;

        let mut request = TaskRequest::work(
            action.domain.clone(),
            action.name.clone(),
            action.payload.clone(),
        );
        if let Some(parent) = options.task_id {
            request = request.with_correlation(parent);
        }

        dispatch(
            handler,
            Task::from_request(request),
            options.cancel.child_token(),
            options.step_timeout,
        )
        .await
    }

    /// Plan from a fresh live snapshot; the snapshot becomes the new working copy.
    async fn replan(
        &self,
        live: &dyn StateSource,
        goal: &Goal,
    ) -> Result<(Plan, WorldState), ExecutionError> {
        let state = live.snapshot().await.map_err(|e| state_error(&e))?;
        let catalog = self
            .cost_model
            .as_ref()
            .map_or_else(|| self.catalog.clone(), |model| model.apply(&self.catalog));
        let plan = self
            .planner
            .plan(&state, goal, &catalog)
            .map_err(ExecutionError::Planning)?;
        debug!(steps = plan.len(), cost = plan.total_cost(), "Replanned");
        Ok((plan, state))
    }

    fn record_outcome(&self, action: &str, success: bool) {
        if let Some(model) = &self.cost_model {
            model.record(action, success);
        }
    }

    async fn persist_costs(&self) {
        if let Some(model) = &self.cost_model {
            if let Err(err) = model.persist().await {
                warn!(error = %err, "Failed to persist learned action costs");
            }
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(events) = &self.events {
            events.publish(event.into());
        }
    }
}

fn take_goal_update(updates: &mut Option<watch::Receiver<Option<Goal>>>) -> Option<Goal> {
    let rx = updates.as_mut()?;
    if !rx.has_changed().unwrap_or(false) {
        return None;
    }
    rx.borrow_and_update().clone()
}

fn state_error(err: &anyhow::Error) -> ExecutionError {
    ExecutionError::handler_failed("world-state", format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::SharedWorldState;
    use crate::domain::errors::HandlerError;
    use crate::domain::models::action::{Condition, Effect};
    use crate::domain::models::world_state::Metric;
    use crate::domain::ports::DomainTaskHandler;
    use crate::services::event_bus::EventBus;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingHandler {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl DomainTaskHandler for RecordingHandler {
        async fn execute(
            &self,
            task: &Task,
            _cancel: CancellationToken,
        ) -> Result<TaskOutput, HandlerError> {
            self.calls.lock().push(task.task_type.clone());
            if self.fail {
                Err(HandlerError::failed("generator crashed"))
            } else {
                Ok(TaskOutput::empty())
            }
        }
    }

    fn coverage_goal(target: f64) -> Goal {
        Goal::new("coverage").require(Condition::at_least(Metric::LineCoverage, target))
    }

    fn executor(registry: HandlerRegistry, actions: Vec<Action>) -> PlanExecutor {
        PlanExecutor::new(
            registry,
            GoalPlanner::default(),
            ActionCatalog::new(actions).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_update_live_state() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("test-generation", handler.clone())
            .build();
        let spawn = Action::new("spawnTester", "test-generation", 1.0).produces(Effect::AddAgent {
            agent_type: "tester".to_string(),
        });
        let gen = Action::new("genUnit", "test-generation", 1.0)
            .requires(Condition::agent("tester"))
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let exec = executor(registry, vec![spawn.clone(), gen.clone()]);

        let live = SharedWorldState::default();
        let plan = Plan::new(coverage_goal(10.0), vec![spawn, gen], 0);
        let report = exec.execute(plan, &live, ExecutionOptions::default()).await;

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert!(report.goal_satisfied);
        assert_eq!(handler.calls(), vec!["spawnTester", "genUnit"]);
        let state = live.snapshot().await.unwrap();
        assert!((state.coverage.line - 10.0).abs() < f64::EPSILON);
        assert!(state.has_agent("tester"));
    }

    #[tokio::test]
    async fn test_drift_aborts_by_default() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("security-scanning", handler.clone())
            .build();
        let scan = Action::new("runScan", "security-scanning", 1.0)
            .requires(Condition::agent("scanner"))
            .produces(Effect::set_flag("scan_complete", true));
        let exec = executor(registry, vec![scan.clone()]);

        // Planned assuming a scanner, but the live state has none.
        let live = SharedWorldState::default();
        let goal = Goal::new("scanned").require(Condition::flag("scan_complete", true));
        let report = exec
            .execute(Plan::new(goal, vec![scan], 0), &live, ExecutionOptions::default())
            .await;

        assert_eq!(report.status, ExecutionStatus::Aborted);
        assert!(matches!(
            report.error,
            Some(ExecutionError::PreconditionViolated { .. })
        ));
        assert!(handler.calls().is_empty());
        assert!(!report.goal_satisfied);
    }

    #[tokio::test]
    async fn test_skip_and_continue_leaves_state_unmutated() {
        let broken = Arc::new(RecordingHandler::failing());
        let healthy = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("security-scanning", broken)
            .register("test-generation", healthy.clone())
            .build();
        let scan = Action::new("runScan", "security-scanning", 1.0)
            .produces(Effect::set_flag("scan_complete", true));
        let gen = Action::new("genUnit", "test-generation", 1.0)
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let exec = executor(registry, vec![scan.clone(), gen.clone()]);

        let live = SharedWorldState::default();
        let options = ExecutionOptions::default().with_policy(FailurePolicy::SkipAndContinue);
        let report = exec
            .execute(Plan::new(coverage_goal(10.0), vec![scan, gen], 0), &live, options)
            .await;

        assert_eq!(report.status, ExecutionStatus::PartialSuccess);
        assert_eq!(report.failed_steps(), 1);
        assert_eq!(report.completed_steps(), 1);
        assert!(!report.final_state.flag("scan_complete"));
        assert!(report.goal_satisfied);
        assert_eq!(healthy.calls(), vec!["genUnit"]);
    }

    #[tokio::test]
    async fn test_replan_routes_around_unreliable_action() {
        let flaky = Arc::new(RecordingHandler::failing());
        let steady = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("flaky", flaky.clone())
            .register("steady", steady.clone())
            .build();
        let cheap = Action::new("genUnit", "flaky", 1.0).produces(Effect::add(Metric::LineCoverage, 10.0));
        let solid = Action::new("genIntegration", "steady", 1.5)
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let exec = executor(registry, vec![cheap.clone(), solid])
            .with_cost_model(Arc::new(CostModel::new()));

        let live = SharedWorldState::default();
        let options = ExecutionOptions::default().with_policy(FailurePolicy::Replan);
        let report = exec
            .execute(Plan::new(coverage_goal(10.0), vec![cheap], 0), &live, options)
            .await;

        assert_eq!(report.status, ExecutionStatus::PartialSuccess);
        assert_eq!(report.replans, 1);
        assert!(report.goal_satisfied);
        assert_eq!(flaky.calls(), vec!["genUnit"]);
        assert_eq!(steady.calls(), vec!["genIntegration"]);
    }

    #[tokio::test]
    async fn test_replan_budget_is_bounded() {
        let flaky = Arc::new(RecordingHandler::failing());
        let registry = HandlerRegistry::builder().register("flaky", flaky.clone()).build();
        let cheap = Action::new("genUnit", "flaky", 1.0).produces(Effect::add(Metric::LineCoverage, 10.0));
        let exec = executor(registry, vec![cheap.clone()]);

        let live = SharedWorldState::default();
        let mut options = ExecutionOptions::default().with_policy(FailurePolicy::Replan);
        options.max_replans = 2;
        let report = exec
            .execute(Plan::new(coverage_goal(10.0), vec![cheap], 0), &live, options)
            .await;

        assert_eq!(report.status, ExecutionStatus::Aborted);
        assert_eq!(report.replans, 2);
        assert_eq!(flaky.calls().len(), 3);
        assert_eq!(report.error.map(|e| e.kind()), Some("handler_failed"));
    }

    /// Raises live coverage out of band, then fails the step.
    struct DriftingHandler {
        live: Arc<SharedWorldState>,
    }

    #[async_trait]
    impl DomainTaskHandler for DriftingHandler {
        async fn execute(
            &self,
            _task: &Task,
            _cancel: CancellationToken,
        ) -> Result<TaskOutput, HandlerError> {
            self.live.update(|state| state.coverage.line = 95.0).await;
            Err(HandlerError::failed("report upload failed"))
        }
    }

    #[tokio::test]
    async fn test_replan_after_live_drift_meets_goal() {
        let live = Arc::new(SharedWorldState::default());
        let registry = HandlerRegistry::builder()
            .register("test-generation", Arc::new(DriftingHandler { live: live.clone() }))
            .build();
        let gen = Action::new("genUnit", "test-generation", 1.0)
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let exec = executor(registry, vec![gen.clone()]);

        let options = ExecutionOptions::default().with_policy(FailurePolicy::Replan);
        let report = exec
            .execute(Plan::new(coverage_goal(10.0), vec![gen], 0), live.as_ref(), options)
            .await;

        assert_eq!(report.status, ExecutionStatus::PartialSuccess);
        assert_eq!(report.replans, 1);
        assert!(report.goal_satisfied);
        assert!((report.final_state.coverage.line - 95.0).abs() < f64::EPSILON);
        assert!(report.into_output(&DomainId::from("test-generation")).is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("test-generation", handler.clone())
            .build();
        let gen = Action::new("genUnit", "test-generation", 1.0)
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let exec = executor(registry, vec![gen.clone()]);

        let token = CancellationToken::new();
        token.cancel();
        let report = exec
            .execute(
                Plan::new(coverage_goal(10.0), vec![gen], 0),
                &SharedWorldState::default(),
                ExecutionOptions::default().with_cancel(token),
            )
            .await;

        assert_eq!(report.status, ExecutionStatus::Cancelled);
        assert!(handler.calls().is_empty());
        assert_eq!(
            report.into_output(&DomainId::from("test-generation")),
            Err(ExecutionError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_goal_change_triggers_replan() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("test-generation", handler.clone())
            .register("security-scanning", handler.clone())
            .build();
        let gen = Action::new("genUnit", "test-generation", 1.0)
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let scan = Action::new("runScan", "security-scanning", 1.0)
            .produces(Effect::set_flag("scan_complete", true));
        let exec = executor(registry, vec![gen.clone(), scan]);

        let (tx, rx) = watch::channel(None);
        tx.send_replace(Some(
            Goal::new("scanned").require(Condition::flag("scan_complete", true)),
        ));
        let report = exec
            .execute(
                Plan::new(coverage_goal(10.0), vec![gen], 0),
                &SharedWorldState::default(),
                ExecutionOptions::default().with_goal_updates(rx),
            )
            .await;

        assert_eq!(report.goal.name, "scanned");
        assert_eq!(report.goal_changes, 1);
        assert!(report.goal_satisfied);
        assert_eq!(handler.calls(), vec!["runScan"]);
    }

    #[tokio::test]
    async fn test_snapshots_and_events() {
        let handler = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::builder()
            .register("test-generation", handler)
            .build();
        let gen = Action::new("genUnit", "test-generation", 1.0)
            .produces(Effect::add(Metric::LineCoverage, 10.0));
        let bus = EventBus::default();
        let exec = executor(registry, vec![gen.clone()]).with_events(Arc::new(bus.clone()));

        let mut options = ExecutionOptions::default();
        options.snapshot_states = true;
        let report = exec
            .execute(
                Plan::new(coverage_goal(10.0), vec![gen], 0),
                &SharedWorldState::default(),
                options,
            )
            .await;

        let step = &report.steps[0];
        assert!(step.before.as_ref().unwrap().coverage.line.abs() < f64::EPSILON);
        assert!((step.after.as_ref().unwrap().coverage.line - 10.0).abs() < f64::EPSILON);
        let types: Vec<String> = bus.history().into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["plan.step.completed"]);

        let output = report.into_output(&DomainId::from("test-generation")).unwrap();
        assert_eq!(output.data["status"], "completed");
    }
}
