use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::coordinator_context::{CoordinatorContext, RunningCounter, TaskTrace};
use super::validation::validate_request;
use super::work_stealing::{
    DomainLoad, RebalanceTarget, RebalancerHandle, RebalancerHealth, RebalancerStatus, StolenTask,
    WorkStealingRebalancer,
};
use crate::domain::errors::{
    AdmissionError, AdmissionResult, CoordinatorError, ExecutionError, RebalanceError,
};
use crate::domain::models::action::ActionCatalog;
use crate::domain::models::config::{Config, CoordinatorConfig, ExecutorConfig, WorkStealingConfig};
use crate::domain::models::event::{event_types, LifecycleEvent};
use crate::domain::models::goal::Goal;
use crate::domain::models::task::{DomainId, Task, TaskKind, TaskOutput, TaskRequest, TaskStatus};
use crate::domain::ports::{EpisodeRecord, EventPublisher, HistoryStore, StateSource};
use crate::services::{
    dispatch, CostModel, EventBus, ExecutionOptions, GoalPlanner, HandlerRegistry, PlanExecutor,
    Subscription,
};

/// Returned by `submit_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    pub task_id: Uuid,
    pub domain: DomainId,
    /// `Assigned` when a slot was free, otherwise `Queued`.
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DomainHealth {
    pub queue_depth: usize,
    pub running: usize,
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorHealth {
    pub per_domain: BTreeMap<String, DomainHealth>,
    pub running: usize,
    pub queued: usize,
    pub max_concurrent_tasks: usize,
    pub rebalancer: RebalancerHealth,
}

/// Lifetime counters plus current occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub rebalanced: u64,
    pub running: usize,
    pub queued: usize,
    pub trace_contexts: usize,
    pub average_latency_ms: Option<f64>,
}

/// Everything a coordinator needs to run planned tasks.
pub struct PlanningSupport {
    pub planner: GoalPlanner,
    pub catalog: ActionCatalog,
    pub state: Arc<dyn StateSource>,
    pub cost_model: Arc<CostModel>,
}

#[derive(Deserialize)]
struct GoalChangePayload {
    task_id: Uuid,
    goal: Goal,
}

/// Admits, queues, dispatches and retires tasks across analysis domains.
///
/// The coordinator owns one [`CoordinatorContext`] behind a mutex that is
/// never held across an `.await`. Admission increments the running counter
/// before comparing it against `max_concurrent_tasks`, so a burst of
/// concurrent submissions can never overshoot the limit. Every dispatch goes
/// through the handler boundary with a timeout; handler errors, timeouts and
/// panics all resolve the task as `failed`.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use fleetcore::application::TaskCoordinator;
/// use fleetcore::domain::models::{Config, TaskRequest};
/// use fleetcore::services::{EventBus, HandlerRegistry};
///
/// # async fn example(handlers: HandlerRegistry) -> anyhow::Result<()> {
/// let config = Config::default();
/// let bus = EventBus::new(&config.event_bus);
/// let coordinator = TaskCoordinator::builder(&config, handlers, Arc::new(bus)).build();
///
/// let handle = coordinator.submit_task(TaskRequest::work(
///     "coverage-analysis",
///     "line-coverage",
///     serde_json::json!({"path": "src"}),
/// ))?;
/// println!("{} is {}", handle.task_id, handle.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    executor_config: ExecutorConfig,
    work_stealing: WorkStealingConfig,
    handlers: HandlerRegistry,
    events: Arc<dyn EventPublisher>,
    history: Option<Arc<dyn HistoryStore>>,
    planning: Option<PlanningSupport>,
    ctx: Mutex<CoordinatorContext>,
    running: RunningCounter,
    rebalancer: Arc<RebalancerStatus>,
}

/// Builder for [`TaskCoordinator`].
pub struct TaskCoordinatorBuilder {
    config: Config,
    handlers: HandlerRegistry,
    events: Arc<dyn EventPublisher>,
    history: Option<Arc<dyn HistoryStore>>,
    planning: Option<PlanningSupport>,
}

impl TaskCoordinatorBuilder {
    #[must_use]
    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Enable planned tasks with a fresh cost model.
    #[must_use]
    pub fn planning(self, catalog: ActionCatalog, state: Arc<dyn StateSource>) -> Self {
        self.planning_with_costs(catalog, state, Arc::new(CostModel::new()))
    }

    /// Enable planned tasks with a preloaded cost model.
    #[must_use]
    pub fn planning_with_costs(
        mut self,
        catalog: ActionCatalog,
        state: Arc<dyn StateSource>,
        cost_model: Arc<CostModel>,
    ) -> Self {
        self.planning = Some(PlanningSupport {
            planner: GoalPlanner::new(self.config.planner.clone()),
            catalog,
            state,
            cost_model,
        });
        self
    }

    pub fn build(self) -> TaskCoordinator {
        let coordinator = &self.config.coordinator;
        let ctx = CoordinatorContext::new(
            coordinator.task_trace_history_cap,
            coordinator.completed_history_cap,
            coordinator.retired_id_cap,
        );
        info!(
            max_concurrent_tasks = coordinator.max_concurrent_tasks,
            domains = self.handlers.len(),
            planning = self.planning.is_some(),
            "Task coordinator initialized"
        );

        TaskCoordinator {
            inner: Arc::new(CoordinatorInner {
                config: self.config.coordinator,
                executor_config: self.config.executor,
                work_stealing: self.config.work_stealing,
                handlers: self.handlers,
                events: self.events,
                history: self.history,
                planning: self.planning,
                ctx: Mutex::new(ctx),
                running: RunningCounter::new(),
                rebalancer: Arc::new(RebalancerStatus::new()),
            }),
        }
    }
}

impl TaskCoordinator {
    pub fn builder(
        config: &Config,
        handlers: HandlerRegistry,
        events: Arc<dyn EventPublisher>,
    ) -> TaskCoordinatorBuilder {
        TaskCoordinatorBuilder {
            config: config.clone(),
            handlers,
            events,
            history: None,
            planning: None,
        }
    }

    /// Admit a task: dispatch it now if a slot is free, otherwise queue it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`AdmissionError::ValidationError`] for malformed requests or unknown domains
    /// - [`AdmissionError::QueueFull`] when the domain queue is at `max_queue_depth`
    #[instrument(skip(self, request), fields(domain = %request.domain, task_type = %request.task_type))]
    pub fn submit_task(&self, request: TaskRequest) -> AdmissionResult<TaskHandle> {
        if let Err(err) = validate_request(
            &request,
            &self.inner.handlers,
            self.inner.planning.is_some(),
        ) {
            self.inner.ctx.lock().counters.rejected += 1;
            warn!(error = %err, "Task rejected");
            return Err(err);
        }

        let mut task = Task::from_request(request);
        let task_id = task.id;
        let domain = task.domain.clone();

        let (status, queue_depth) = {
            let mut guard = self.inner.ctx.lock();
            let ctx = &mut *guard;

            if self.inner.running.try_acquire(self.inner.config.max_concurrent_tasks) {
                if let Err(err) = task.transition(TaskStatus::Assigned) {
                    self.inner.running.release();
                    return Err(AdmissionError::ValidationError(err.to_string()));
                }
                ctx.slot_taken(&domain);
                ctx.tokens.insert(task_id, CancellationToken::new());
                ctx.traces.start(&task);
                ctx.tasks.insert(task_id, task);
                ctx.counters.submitted += 1;
                (TaskStatus::Assigned, ctx.queue_depth(&domain))
            } else {
                let depth = ctx.queue_depth(&domain);
                let capacity = self.inner.config.max_queue_depth;
                if depth >= capacity {
                    ctx.counters.rejected += 1;
                    warn!(queue_depth = depth, "Domain queue full");
                    return Err(AdmissionError::QueueFull {
                        domain: domain.to_string(),
                        capacity,
                    });
                }
                ctx.traces.start(&task);
                ctx.enqueue(task_id, &domain);
                ctx.tasks.insert(task_id, task);
                ctx.counters.submitted += 1;
                (TaskStatus::Queued, depth + 1)
            }
        };

        if status == TaskStatus::Queued {
            debug!(task_id = %task_id, queue_depth, "Task queued");
            self.publish(LifecycleEvent::TaskQueued {
                task_id,
                domain: domain.clone(),
                queue_depth,
            });
        } else {
            debug!(task_id = %task_id, "Task assigned");
            self.publish(LifecycleEvent::TaskAssigned {
                task_id,
                domain: domain.clone(),
            });
            self.spawn_dispatch(task_id);
        }

        Ok(TaskHandle {
            task_id,
            domain,
            status,
        })
    }

    /// Cancel a task in any non-terminal state. Cancelling a finished task is a no-op.
    ///
    /// Running handlers are signalled through their cancellation token; their
    /// eventual result is discarded.
    ///
    /// Cancelling a retired task is a no-op for as long as its id stays in the
    /// retired window (`coordinator.retired_id_cap` most recent ids).
    ///
    /// # Errors
    /// Returns [`CoordinatorError::NotFound`] for ids the coordinator has never
    /// seen or has forgotten.
    #[instrument(skip(self))]
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<(), CoordinatorError> {
        let (retired, previous, promoted) = {
            let mut guard = self.inner.ctx.lock();
            let ctx = &mut *guard;

            let Some(task) = ctx.tasks.get_mut(&task_id) else {
                if ctx.is_retired(task_id) {
                    debug!("Task already finished; cancel ignored");
                    return Ok(());
                }
                return Err(CoordinatorError::NotFound(task_id));
            };

            let previous = task.status;
            task.transition(TaskStatus::Cancelled)?;
            let domain = task.assigned_domain.clone();
            ctx.traces.record(task, None);

            if previous == TaskStatus::Queued {
                ctx.remove_from_queue(task_id, &domain);
            }
            if let Some(token) = ctx.tokens.get(&task_id) {
                token.cancel();
            }

            let promoted = if previous.holds_slot() {
                self.release_slot(ctx, &domain);
                self.promote(ctx)
            } else {
                Vec::new()
            };
            ctx.counters.cancelled += 1;
            (ctx.retire(task_id), previous, promoted)
        };

        if let Some(task) = &retired {
            info!(previous = %previous, "Task cancelled");
            self.publish(LifecycleEvent::TaskCancelled {
                task_id,
                domain: task.assigned_domain.clone(),
                previous_status: previous,
            });
        }
        self.launch(promoted);
        self.record_episode(retired).await;
        Ok(())
    }

    /// Resolve a task as completed, free its slot and promote the next queued task.
    ///
    /// Results for tasks that were already retired (for example after a
    /// cancel) are ignored.
    ///
    /// # Errors
    /// - [`CoordinatorError::NotFound`] for unknown ids
    /// - [`CoordinatorError::InvalidTransition`] if the task is still queued
    pub async fn on_completed(&self, task_id: Uuid, output: TaskOutput) -> Result<(), CoordinatorError> {
        self.finish(task_id, Ok(output)).await
    }

    /// Resolve a task as failed, free its slot and promote the next queued task.
    ///
    /// # Errors
    /// Same as [`on_completed`](Self::on_completed).
    pub async fn on_failed(&self, task_id: Uuid, error: ExecutionError) -> Result<(), CoordinatorError> {
        self.finish(task_id, Err(error)).await
    }

    #[instrument(skip(self, result), fields(success = result.is_ok()))]
    async fn finish(
        &self,
        task_id: Uuid,
        result: Result<TaskOutput, ExecutionError>,
    ) -> Result<(), CoordinatorError> {
        let (retired, promoted) = {
            let mut guard = self.inner.ctx.lock();
            let ctx = &mut *guard;

            let Some(task) = ctx.tasks.get_mut(&task_id) else {
                if ctx.is_retired(task_id) {
                    debug!("Result for retired task discarded");
                    return Ok(());
                }
                return Err(CoordinatorError::NotFound(task_id));
            };

            match &result {
                Ok(output) => {
                    if task.status == TaskStatus::Assigned {
                        task.transition(TaskStatus::Running)?;
                    }
                    task.transition(TaskStatus::Completed)?;
                    task.output = Some(output.clone());
                }
                Err(err) => {
                    task.transition(TaskStatus::Failed)?;
                    task.error = Some(err.to_string());
                }
            }
            let domain = task.assigned_domain.clone();
            let latency = task.latency_ms();
            let note = result.as_ref().err().map(ToString::to_string);
            ctx.traces.record(task, note);

            if result.is_ok() {
                ctx.counters.completed += 1;
                ctx.counters.record_latency(latency);
            } else {
                ctx.counters.failed += 1;
            }
            self.release_slot(ctx, &domain);
            let retired = ctx.retire(task_id);
            (retired, self.promote(ctx))
        };

        if let Some(task) = &retired {
            let domain = task.assigned_domain.clone();
            match &result {
                Ok(_) => {
                    info!(latency_ms = ?task.latency_ms(), "Task completed");
                    self.publish(LifecycleEvent::TaskCompleted {
                        task_id,
                        domain,
                        latency_ms: task.latency_ms(),
                    });
                }
                Err(err) => {
                    warn!(error = %err, kind = err.kind(), "Task failed");
                    self.publish(LifecycleEvent::TaskFailed {
                        task_id,
                        domain,
                        error_kind: err.kind().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        self.launch(promoted);
        self.record_episode(retired).await;
        Ok(())
    }

    pub fn get_health(&self) -> CoordinatorHealth {
        let ctx = self.inner.ctx.lock();
        let mut per_domain: BTreeMap<String, DomainHealth> = self
            .inner
            .handlers
            .domains()
            .into_iter()
            .map(|d| (d.to_string(), DomainHealth::default()))
            .collect();
        for (domain, queue) in &ctx.queues {
            per_domain.entry(domain.to_string()).or_default().queue_depth = queue.len();
        }
        for (domain, running) in &ctx.running_by_domain {
            per_domain.entry(domain.to_string()).or_default().running = *running;
        }

        CoordinatorHealth {
            per_domain,
            running: self.inner.running.get(),
            queued: ctx.queued_total(),
            max_concurrent_tasks: self.inner.config.max_concurrent_tasks,
            rebalancer: self.inner.rebalancer.snapshot(),
        }
    }

    pub fn get_metrics(&self) -> CoordinatorMetrics {
        let ctx = self.inner.ctx.lock();
        let counters = &ctx.counters;
        CoordinatorMetrics {
            submitted: counters.submitted,
            completed: counters.completed,
            failed: counters.failed,
            cancelled: counters.cancelled,
            rejected: counters.rejected,
            rebalanced: counters.rebalanced,
            running: self.inner.running.get(),
            queued: ctx.queued_total(),
            trace_contexts: ctx.traces.len(),
            average_latency_ms: counters.average_latency_ms(),
        }
    }

    /// Active task, or a retired one still in the completed history.
    pub fn get_task(&self, task_id: Uuid) -> Option<Task> {
        let ctx = self.inner.ctx.lock();
        ctx.tasks.get(&task_id).cloned().or_else(|| {
            ctx.completed
                .iter()
                .rev()
                .find(|t| t.id == task_id)
                .cloned()
        })
    }

    pub fn trace(&self, task_id: Uuid) -> Option<TaskTrace> {
        self.inner.ctx.lock().traces.get(task_id).cloned()
    }

    /// Retired tasks, oldest first.
    pub fn completed_history(&self) -> Vec<Task> {
        self.inner.ctx.lock().completed.iter().cloned().collect()
    }

    pub fn running_count(&self) -> usize {
        self.inner.running.get()
    }

    /// Retarget a planned task. A running plan replans before its next step.
    ///
    /// # Errors
    /// - [`CoordinatorError::NotFound`] for unknown or retired tasks
    /// - [`CoordinatorError::NoActivePlan`] for work tasks or finished plans
    pub fn update_goal(&self, task_id: Uuid, goal: Goal) -> Result<(), CoordinatorError> {
        let mut guard = self.inner.ctx.lock();
        let ctx = &mut *guard;

        if let Some(sender) = ctx.goal_senders.get(&task_id) {
            info!(task_id = %task_id, goal = %goal.name, "Goal updated for running plan");
            sender.send_replace(Some(goal));
            return Ok(());
        }
        match ctx.tasks.get_mut(&task_id) {
            Some(task) if matches!(task.status, TaskStatus::Queued | TaskStatus::Assigned) => {
                match &mut task.kind {
                    TaskKind::Plan { goal: current } => {
                        *current = goal;
                        Ok(())
                    }
                    TaskKind::Work { .. } => Err(CoordinatorError::NoActivePlan(task_id)),
                }
            }
            Some(_) => Err(CoordinatorError::NoActivePlan(task_id)),
            None => Err(CoordinatorError::NotFound(task_id)),
        }
    }

    /// Route `goal.changed` bus events to [`update_goal`](Self::update_goal).
    pub fn attach_goal_listener(&self, bus: &EventBus) -> Subscription {
        let inner: Weak<CoordinatorInner> = Arc::downgrade(&self.inner);
        bus.subscribe(event_types::GOAL_CHANGED, move |event| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let coordinator = Self { inner };
            match serde_json::from_value::<GoalChangePayload>(event.payload.clone()) {
                Ok(change) => {
                    if let Err(err) = coordinator.update_goal(change.task_id, change.goal) {
                        debug!(error = %err, "Ignoring goal change");
                    }
                }
                Err(err) => warn!(error = %err, "Malformed goal.changed payload"),
            }
        })
    }

    /// Start the rebalancer loop if work stealing is enabled.
    pub fn start_work_stealing(&self) -> Option<RebalancerHandle> {
        if !self.inner.work_stealing.enabled {
            debug!("Work stealing disabled by configuration");
            return None;
        }
        let rebalancer = WorkStealingRebalancer::new(
            self.inner.work_stealing.clone(),
            Arc::new(self.clone()),
            self.rebalancer_status(),
            Some(Arc::clone(&self.inner.events)),
        );
        Some(rebalancer.start())
    }

    /// Status shared with any rebalancer driving this coordinator.
    pub fn rebalancer_status(&self) -> Arc<RebalancerStatus> {
        Arc::clone(&self.inner.rebalancer)
    }

    fn publish(&self, event: LifecycleEvent) {
        self.inner.events.publish(event.into());
    }

    fn release_slot(&self, ctx: &mut CoordinatorContext, domain: &DomainId) {
        if !self.inner.running.release() {
            warn!(domain = %domain, "Running counter already at zero");
        }
        ctx.slot_freed(domain);
    }

    /// Fill free slots from the queue heads. Returns the promoted tasks.
    fn promote(&self, ctx: &mut CoordinatorContext) -> Vec<(Uuid, DomainId)> {
        let mut promoted = Vec::new();
        while let Some((domain, task_id)) = ctx.next_queued() {
            if !self.inner.running.try_acquire(self.inner.config.max_concurrent_tasks) {
                break;
            }
            ctx.remove_from_queue(task_id, &domain);
            let Some(task) = ctx.tasks.get_mut(&task_id) else {
                self.inner.running.release();
                continue;
            };
            if let Err(err) = task.transition(TaskStatus::Assigned) {
                warn!(task_id = %task_id, error = %err, "Queued task could not be promoted");
                self.inner.running.release();
                continue;
            }
            ctx.traces.record(task, Some("promoted".to_string()));
            ctx.slot_taken(&domain);
            ctx.tokens.insert(task_id, CancellationToken::new());
            promoted.push((task_id, domain));
        }
        promoted
    }

    fn launch(&self, promoted: Vec<(Uuid, DomainId)>) {
        for (task_id, domain) in promoted {
            debug!(task_id = %task_id, domain = %domain, "Promoted queued task");
            self.publish(LifecycleEvent::TaskAssigned { task_id, domain });
            self.spawn_dispatch(task_id);
        }
    }

    fn spawn_dispatch(&self, task_id: Uuid) {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run_task(task_id).await });
    }

    async fn run_task(&self, task_id: Uuid) {
        let started = {
            let mut guard = self.inner.ctx.lock();
            let ctx = &mut *guard;
            let Some(task) = ctx.tasks.get_mut(&task_id) else {
                return;
            };
            if task.status != TaskStatus::Assigned {
                return;
            }
            if let Err(err) = task.transition(TaskStatus::Running) {
                warn!(task_id = %task_id, error = %err, "Task could not start");
                return;
            }
            ctx.traces.record(task, None);
            let task = task.clone();

            let goal_updates = task.is_planned().then(|| {
                let (tx, rx) = watch::channel(None);
                ctx.goal_senders.insert(task_id, tx);
                rx
            });
            let token = ctx
                .tokens
                .entry(task_id)
                .or_insert_with(CancellationToken::new)
                .clone();
            (task, token, goal_updates)
        };
        let (task, token, goal_updates) = started;

        self.publish(LifecycleEvent::TaskStarted {
            task_id,
            domain: task.assigned_domain.clone(),
        });

        let result = match goal_updates {
            Some(updates) => self.run_plan(&task, token, updates).await,
            None => self.run_work(task, token).await,
        };

        let resolved = match result {
            Ok(output) => self.on_completed(task_id, output).await,
            Err(err) => self.on_failed(task_id, err).await,
        };
        if let Err(err) = resolved {
            debug!(task_id = %task_id, error = %err, "Task result not applied");
        }
    }

    async fn run_work(&self, task: Task, cancel: CancellationToken) -> Result<TaskOutput, ExecutionError> {
        let domain = task.assigned_domain.clone();
        let Some(handler) = self.inner.handlers.get(domain.as_str()) else {
            return Err(ExecutionError::handler_failed(
                domain.as_str(),
                "no handler registered",
            ));
        };
        dispatch(handler, task, cancel, self.inner.config.dispatch_timeout())
            .await
            .inspect_err(|err| debug!(domain = %domain, error = %err, "Dispatch failed"))
    }

    async fn run_plan(
        &self,
        task: &Task,
        cancel: CancellationToken,
        goal_updates: watch::Receiver<Option<Goal>>,
    ) -> Result<TaskOutput, ExecutionError> {
        let domain = &task.assigned_domain;
        let (Some(planning), TaskKind::Plan { goal }) = (&self.inner.planning, &task.kind) else {
            return Err(ExecutionError::handler_failed(
                domain.as_str(),
                "planning is not configured",
            ));
        };

        let state = planning.state.snapshot().await.map_err(|err| {
            ExecutionError::handler_failed("world-state", format!("{err:#}"))
        })?;
        let catalog = planning.cost_model.apply(&planning.catalog);
        let plan = planning
            .planner
            .plan(&state, goal, &catalog)
            .map_err(ExecutionError::Planning)?;

        self.publish(LifecycleEvent::PlanCreated {
            task_id: Some(task.id),
            goal: goal.name.clone(),
            steps: plan.action_names().into_iter().map(String::from).collect(),
            total_cost: plan.total_cost(),
        });

        let executor = PlanExecutor::new(
            self.inner.handlers.clone(),
            planning.planner.clone(),
            planning.catalog.clone(),
        )
        .with_cost_model(Arc::clone(&planning.cost_model))
        .with_events(Arc::clone(&self.inner.events));
        let options =
            ExecutionOptions::from_config(&self.inner.executor_config, self.inner.config.dispatch_timeout())
                .with_cancel(cancel)
                .with_goal_updates(goal_updates)
                .for_task(task.id);

        let report = executor.execute(plan, planning.state.as_ref(), options).await;
        self.inner.ctx.lock().goal_senders.remove(&task.id);
        report.into_output(domain)
    }

    async fn record_episode(&self, task: Option<Task>) {
        let (Some(store), Some(task)) = (&self.inner.history, task) else {
            return;
        };
        if let Err(err) = store.append_episode(EpisodeRecord::from_task(&task)).await {
            warn!(task_id = %task.id, error = %err, "Failed to record task episode");
        }
    }
}

impl RebalanceTarget for TaskCoordinator {
    fn domain_loads(&self) -> Vec<DomainLoad> {
        let ctx = self.inner.ctx.lock();
        self.inner
            .handlers
            .domains()
            .into_iter()
            .map(|domain| DomainLoad {
                queued: ctx.queue_depth(&domain),
                running: ctx.running_in(&domain),
                domain,
            })
            .collect()
    }

    fn steal_one(&self, from: &DomainId, to: &DomainId) -> Result<Option<StolenTask>, RebalanceError> {
        let Some(handler) = self.inner.handlers.get(to.as_str()) else {
            return Err(RebalanceError::CycleFailed(format!(
                "no handler registered for destination '{to}'"
            )));
        };

        let stolen = {
            let mut guard = self.inner.ctx.lock();
            let ctx = &mut *guard;
            ctx.verify_queue_membership()
                .map_err(RebalanceError::CycleFailed)?;

            let candidate = ctx.queues.get(from).and_then(|queue| {
                queue
                    .iter()
                    .rev()
                    .find(|id| ctx.tasks.get(*id).is_some_and(|t| handler.can_service(t)))
                    .copied()
            });
            let Some(task_id) = candidate else {
                return Ok(None);
            };

            ctx.remove_from_queue(task_id, from);
            ctx.enqueue(task_id, to);
            if let Some(task) = ctx.tasks.get_mut(&task_id) {
                task.assigned_domain = to.clone();
                task.updated_at = chrono::Utc::now();
                ctx.traces.record(task, Some(format!("rebalanced from {from}")));
            }
            ctx.counters.rebalanced += 1;
            StolenTask {
                task_id,
                from: from.clone(),
                to: to.clone(),
            }
        };

        info!(task_id = %stolen.task_id, from = %from, to = %to, "Rebalanced queued task");
        self.publish(LifecycleEvent::DomainRebalanced {
            task_id: stolen.task_id,
            from: from.clone(),
            to: to.clone(),
        });
        Ok(Some(stolen))
    }
}
