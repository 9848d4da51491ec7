//! Integration tests for TaskCoordinator admission, dispatch and retirement
//!
//! Exercises the coordinator end to end through real spawned handlers and
//! the event bus stream.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    config_with_limit, coordinator_with, wait_for_status, wait_for_terminal, GatedHandler,
    PanickingHandler, SlowHandler,
};
use fleetcore::domain::models::event_types;
use fleetcore::{
    AdmissionError, ExecutionError, HandlerRegistry, TaskCoordinator, TaskOutput, TaskRequest,
    TaskStatus,
};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

const COVERAGE: &str = "coverage";

fn scan() -> TaskRequest {
    TaskRequest::work(COVERAGE, "line-coverage", json!({ "path": "src" }))
}

// ========================
// Admission and promotion
// ========================

#[tokio::test]
async fn test_third_task_queues_until_a_slot_frees() {
    common::setup_test_logging();
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let (coordinator, bus) = coordinator_with(&config_with_limit(2), handlers);

    let first = coordinator.submit_task(scan()).unwrap();
    let second = coordinator.submit_task(scan()).unwrap();
    let third = coordinator.submit_task(scan()).unwrap();

    assert_eq!(first.status, TaskStatus::Assigned);
    assert_eq!(second.status, TaskStatus::Assigned);
    assert_eq!(third.status, TaskStatus::Queued);
    assert_eq!(coordinator.running_count(), 2);
    assert_eq!(coordinator.get_health().per_domain[COVERAGE].queue_depth, 1);

    assert!(wait_for_status(&coordinator, first.task_id, TaskStatus::Running).await);
    assert!(wait_for_status(&coordinator, second.task_id, TaskStatus::Running).await);

    let mut stream = bus.stream();
    handler.release(1);
    let finished = wait_for_terminal_any(&mut stream).await;
    assert!(finished == first.task_id || finished == second.task_id);

    assert!(wait_for_status(&coordinator, third.task_id, TaskStatus::Running).await);
    assert_eq!(coordinator.running_count(), 2);
    assert_eq!(coordinator.get_health().queued, 0);

    handler.release(2);
    wait_for_terminal(&mut stream, third.task_id).await;
    assert!(wait_for_status(&coordinator, first.task_id, TaskStatus::Completed).await);
    assert!(wait_for_status(&coordinator, second.task_id, TaskStatus::Completed).await);

    let metrics = coordinator.get_metrics();
    assert_eq!(metrics.completed, 3);
    assert_eq!(metrics.running, 0);
    assert!(handler.peak() <= 2);
}

async fn wait_for_terminal_any(
    stream: &mut tokio::sync::broadcast::Receiver<fleetcore::BusEvent>,
) -> uuid::Uuid {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = stream.recv().await.unwrap();
            if event.event_type == event_types::TASK_COMPLETED {
                return event.task_id.unwrap();
            }
        }
    })
    .await
    .expect("no task completed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_never_exceed_limit() {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let (coordinator, _bus) = coordinator_with(&config_with_limit(3), handlers);

    let submitters: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    coordinator.submit_task(scan()).unwrap();
                    assert!(coordinator.running_count() <= 3);
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }

    let health = coordinator.get_health();
    assert_eq!(health.running, 3);
    assert_eq!(health.queued, 37);

    handler.release(40);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while coordinator.get_metrics().completed < 40 && tokio::time::Instant::now() < deadline {
        assert!(coordinator.running_count() <= 3);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let metrics = coordinator.get_metrics();
    assert_eq!(metrics.completed, 40);
    assert_eq!(metrics.running, 0);
    assert_eq!(metrics.queued, 0);
    assert!(handler.peak() <= 3);
}

#[tokio::test]
async fn test_unknown_domain_is_rejected() {
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, GatedHandler::new() as _)
        .build();
    let (coordinator, _bus) = coordinator_with(&config_with_limit(2), handlers);

    let err = coordinator
        .submit_task(TaskRequest::work("chaos-resilience", "inject", json!({})))
        .unwrap_err();
    assert!(matches!(err, AdmissionError::ValidationError(_)));
    assert_eq!(coordinator.get_metrics().rejected, 1);
    assert_eq!(coordinator.running_count(), 0);
}

// ========================
// Failure resolution
// ========================

#[tokio::test]
async fn test_slow_handler_resolves_as_timeout() {
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::new(SlowHandler(Duration::from_millis(50))) as _)
        .build();
    let mut config = config_with_limit(2);
    config.coordinator.dispatch_timeout_ms = 30;
    let (coordinator, bus) = coordinator_with(&config, handlers);

    let mut stream = bus.stream();
    let handle = coordinator.submit_task(scan()).unwrap();
    let event = wait_for_terminal(&mut stream, handle.task_id).await;

    assert_eq!(event.event_type, event_types::TASK_FAILED);
    assert_eq!(event.payload["error_kind"], "timeout");

    let task = coordinator.get_task(handle.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("timed out after 30ms"));
    assert_eq!(coordinator.running_count(), 0);
}

#[tokio::test]
async fn test_panicking_handler_fails_only_its_task() {
    let healthy = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&healthy) as _)
        .register("security", Arc::new(PanickingHandler) as _)
        .build();
    let (coordinator, bus) = coordinator_with(&config_with_limit(4), handlers);

    let mut stream = bus.stream();
    let ok = coordinator.submit_task(scan()).unwrap();
    let crashing = coordinator
        .submit_task(TaskRequest::work("security", "sast", json!({})))
        .unwrap();

    let event = wait_for_terminal(&mut stream, crashing.task_id).await;
    assert_eq!(event.payload["error_kind"], "handler_failed");
    let failed = coordinator.get_task(crashing.task_id).unwrap();
    assert!(failed.error.unwrap().contains("analysis engine crashed"));

    healthy.release(1);
    assert!(wait_for_status(&coordinator, ok.task_id, TaskStatus::Completed).await);
    let metrics = coordinator.get_metrics();
    assert_eq!((metrics.completed, metrics.failed), (1, 1));
}

// ========================
// Cancellation
// ========================

#[tokio::test]
async fn test_cancel_running_task_promotes_queued_work() {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let (coordinator, bus) = coordinator_with(&config_with_limit(1), handlers);

    let running = coordinator.submit_task(scan()).unwrap();
    let queued = coordinator.submit_task(scan()).unwrap();
    assert!(wait_for_status(&coordinator, running.task_id, TaskStatus::Running).await);

    let mut stream = bus.stream();
    coordinator.cancel_task(running.task_id).await.unwrap();
    let event = wait_for_terminal(&mut stream, running.task_id).await;
    assert_eq!(event.event_type, event_types::TASK_CANCELLED);

    assert!(wait_for_status(&coordinator, queued.task_id, TaskStatus::Running).await);
    assert_eq!(coordinator.running_count(), 1);

    handler.release(1);
    wait_for_terminal(&mut stream, queued.task_id).await;

    let metrics = coordinator.get_metrics();
    assert_eq!(metrics.cancelled, 1);
    assert_eq!(metrics.completed, 1);
    assert_eq!(
        coordinator.get_task(running.task_id).map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );
}

#[tokio::test]
async fn test_cancel_queued_task_never_dispatches() {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let (coordinator, _bus) = coordinator_with(&config_with_limit(1), handlers);

    let running = coordinator.submit_task(scan()).unwrap();
    let queued = coordinator.submit_task(scan()).unwrap();
    coordinator.cancel_task(queued.task_id).await.unwrap();
    assert_eq!(coordinator.get_health().queued, 0);

    handler.release(1);
    assert!(wait_for_status(&coordinator, running.task_id, TaskStatus::Completed).await);
    assert_eq!(handler.peak(), 1);
    assert_eq!(coordinator.get_metrics().completed, 1);
}

// ========================
// Bounded history
// ========================

#[tokio::test]
async fn test_trace_contexts_are_capped() {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let mut config = config_with_limit(1);
    config.coordinator.task_trace_history_cap = 3;
    let (coordinator, _bus) = coordinator_with(&config, handlers);

    let handles: Vec<_> = (0..5).map(|_| coordinator.submit_task(scan()).unwrap()).collect();

    assert_eq!(coordinator.get_metrics().trace_contexts, 3);
    assert!(coordinator.trace(handles[0].task_id).is_none());
    assert!(coordinator.trace(handles[1].task_id).is_none());
    let latest = coordinator.trace(handles[4].task_id).unwrap();
    assert_eq!(latest.entries.last().map(|e| e.status), Some(TaskStatus::Queued));
}

#[tokio::test]
async fn test_repeat_cancel_after_history_eviction_is_noop() {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let mut config = config_with_limit(1);
    config.coordinator.task_trace_history_cap = 1;
    config.coordinator.completed_history_cap = 1;
    let (coordinator, _bus) = coordinator_with(&config, handlers);

    let handles: Vec<_> = (0..3).map(|_| coordinator.submit_task(scan()).unwrap()).collect();
    for handle in &handles {
        coordinator.cancel_task(handle.task_id).await.unwrap();
    }
    assert!(coordinator.get_task(handles[0].task_id).is_none());
    assert!(coordinator.trace(handles[0].task_id).is_none());

    coordinator.cancel_task(handles[0].task_id).await.unwrap();
    coordinator
        .on_completed(handles[0].task_id, TaskOutput::empty())
        .await
        .unwrap();
    assert_eq!(coordinator.get_metrics().cancelled, 3);
    assert_eq!(coordinator.running_count(), 0);
}

#[tokio::test]
async fn test_forgotten_task_reports_not_found() {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .build();
    let mut config = config_with_limit(1);
    config.coordinator.completed_history_cap = 1;
    config.coordinator.retired_id_cap = 1;
    let (coordinator, _bus) = coordinator_with(&config, handlers);

    let first = coordinator.submit_task(scan()).unwrap();
    let second = coordinator.submit_task(scan()).unwrap();
    coordinator.cancel_task(first.task_id).await.unwrap();
    coordinator.cancel_task(second.task_id).await.unwrap();

    coordinator.cancel_task(second.task_id).await.unwrap();
    assert!(matches!(
        coordinator.cancel_task(first.task_id).await,
        Err(fleetcore::CoordinatorError::NotFound(id)) if id == first.task_id
    ));
}

// ========================
// Running counter property
// ========================

#[derive(Debug, Clone)]
enum Op {
    Submit { security: bool },
    Cancel(usize),
    Complete(usize),
    Fail(usize),
    Yield,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<bool>().prop_map(|security| Op::Submit { security }),
        1 => any::<usize>().prop_map(Op::Cancel),
        1 => any::<usize>().prop_map(Op::Complete),
        1 => any::<usize>().prop_map(Op::Fail),
        1 => Just(Op::Yield),
    ]
}

fn pick(ids: &[Uuid], i: usize) -> Option<Uuid> {
    (!ids.is_empty()).then(|| ids[i % ids.len()])
}

fn slot_holders(coordinator: &TaskCoordinator, ids: &[Uuid]) -> usize {
    ids.iter()
        .filter_map(|id| coordinator.get_task(*id))
        .filter(|task| task.status.holds_slot())
        .count()
}

async fn run_ops(limit: usize, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let handler = GatedHandler::new();
    let handlers = HandlerRegistry::builder()
        .register(COVERAGE, Arc::clone(&handler) as _)
        .register("security", Arc::clone(&handler) as _)
        .build();
    let (coordinator, _bus) = coordinator_with(&config_with_limit(limit), handlers);
    let mut ids: Vec<Uuid> = Vec::new();

    for op in ops {
        match op {
            Op::Submit { security } => {
                let domain = if security { "security" } else { COVERAGE };
                let request = TaskRequest::work(domain, "sweep", json!({}));
                if let Ok(handle) = coordinator.submit_task(request) {
                    ids.push(handle.task_id);
                }
            }
            Op::Cancel(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = coordinator.cancel_task(id).await;
                }
            }
            Op::Complete(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = coordinator.on_completed(id, TaskOutput::empty()).await;
                }
            }
            Op::Fail(i) => {
                if let Some(id) = pick(&ids, i) {
                    let error = ExecutionError::handler_failed(COVERAGE, "agent lost");
                    let _ = coordinator.on_failed(id, error).await;
                }
            }
            Op::Yield => tokio::task::yield_now().await,
        }

        let running = coordinator.running_count();
        prop_assert!(running <= limit, "running {} exceeds limit {}", running, limit);
        prop_assert_eq!(running, slot_holders(&coordinator, &ids));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_running_count_matches_slot_holders(
        limit in 1usize..=4,
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_ops(limit, ops))?;
    }
}
