//! Common test utilities for integration tests
//!
//! Shared handlers and coordinator fixtures used across the integration
//! test files.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetcore::domain::errors::HandlerError;
use fleetcore::domain::models::{BusEvent, Config, Task, TaskOutput, TaskStatus};
use fleetcore::domain::ports::DomainTaskHandler;
use fleetcore::{EventBus, HandlerRegistry, TaskCoordinator};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Handler that holds every task until a permit is released.
///
/// Counts how many executions are in flight at once so tests can check the
/// concurrency bound.
pub struct GatedHandler {
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    steal: bool,
}

impl GatedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(0)),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            steal: false,
        })
    }

    /// A gated handler that accepts stolen work.
    pub fn accepting_stolen() -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(0)),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            steal: true,
        })
    }

    /// Let `n` blocked executions finish.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainTaskHandler for GatedHandler {
    async fn execute(&self, task: &Task, cancel: CancellationToken) -> Result<TaskOutput, HandlerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = tokio::select! {
            permit = self.permits.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(TaskOutput::new(serde_json::json!({ "task_type": task.task_type })))
                }
                Err(err) => Err(HandlerError::failed(err.to_string())),
            },
            () = cancel.cancelled() => Err(HandlerError::Cancelled),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn can_service(&self, _task: &Task) -> bool {
        self.steal
    }
}

/// Handler that sleeps for a fixed time, ignoring cancellation.
pub struct SlowHandler(pub Duration);

#[async_trait]
impl DomainTaskHandler for SlowHandler {
    async fn execute(&self, _task: &Task, _cancel: CancellationToken) -> Result<TaskOutput, HandlerError> {
        tokio::time::sleep(self.0).await;
        Ok(TaskOutput::empty())
    }
}

/// Handler that always panics.
pub struct PanickingHandler;

#[async_trait]
impl DomainTaskHandler for PanickingHandler {
    async fn execute(&self, _task: &Task, _cancel: CancellationToken) -> Result<TaskOutput, HandlerError> {
        panic!("analysis engine crashed");
    }
}

/// Coordinator over `handlers` with the given concurrency limit.
pub fn coordinator_with(
    config: &Config,
    handlers: HandlerRegistry,
) -> (TaskCoordinator, EventBus) {
    let bus = EventBus::new(&config.event_bus);
    let coordinator = TaskCoordinator::builder(config, handlers, Arc::new(bus.clone())).build();
    (coordinator, bus)
}

pub fn config_with_limit(max_concurrent_tasks: usize) -> Config {
    let mut config = Config::default();
    config.coordinator.max_concurrent_tasks = max_concurrent_tasks;
    config
}

/// Wait for the terminal event of `task_id` on `stream`.
pub async fn wait_for_terminal(stream: &mut broadcast::Receiver<BusEvent>, task_id: Uuid) -> BusEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.recv().await {
                Ok(event) if event.task_id == Some(task_id) && is_terminal_event(&event) => {
                    return event;
                }
                Ok(_) => {}
                Err(err) => panic!("event stream failed: {err}"),
            }
        }
    })
    .await
    .expect("timed out waiting for terminal event")
}

fn is_terminal_event(event: &BusEvent) -> bool {
    use fleetcore::domain::models::event_types::{TASK_CANCELLED, TASK_COMPLETED, TASK_FAILED};
    matches!(event.event_type.as_str(), TASK_COMPLETED | TASK_FAILED | TASK_CANCELLED)
}

/// Poll until `task_id` reaches `status` or the timeout elapses.
pub async fn wait_for_status(coordinator: &TaskCoordinator, task_id: Uuid, status: TaskStatus) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if coordinator.get_task(task_id).map(|t| t.status) == Some(status) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
