//! Planner and admission benchmarks.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use fleetcore::adapters::SimulatedHandler;
use fleetcore::{
    Action, ActionCatalog, Condition, Config, Effect, EventBus, Goal, GoalPlanner,
    HandlerRegistry, Metric, TaskCoordinator, TaskRequest, WorldState,
};
use tokio::runtime::Runtime;

/// A catalog shaped like a real fleet: coverage steps of varying size plus
/// quality and security actions gated on agents.
fn fleet_catalog(coverage_actions: usize) -> ActionCatalog {
    let mut actions: Vec<Action> = (0..coverage_actions)
        .map(|i| {
            let delta = 5.0 * (i as f64 + 1.0);
            Action::new(format!("genTests{i}"), "test-generation", 1.0 + i as f64 * 0.8)
                .produces(Effect::add(Metric::LineCoverage, delta))
        })
        .collect();
    actions.push(
        Action::new("spawnScanner", "security-scanning", 1.0).produces(Effect::AddAgent {
            agent_type: "scanner".to_string(),
        }),
    );
    actions.push(
        Action::new("sastScan", "security-scanning", 3.0)
            .requires(Condition::agent("scanner"))
            .produces(Effect::set(Metric::SecurityScore, 90.0)),
    );
    actions.push(
        Action::new("refactor", "quality-assessment", 4.0)
            .produces(Effect::add(Metric::TechnicalDebt, -10.0)),
    );
    ActionCatalog::new(actions).expect("benchmark catalog is valid")
}

fn release_goal(coverage: f64) -> Goal {
    Goal::new("release-gate")
        .require(Condition::at_least(Metric::LineCoverage, coverage))
        .require(Condition::at_least(Metric::SecurityScore, 80.0))
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planner");
    let planner = GoalPlanner::default();
    let start = WorldState::default();

    for actions in [2usize, 4, 8] {
        let catalog = fleet_catalog(actions);
        for coverage in [40.0, 80.0] {
            let goal = release_goal(coverage);
            group.bench_with_input(
                BenchmarkId::new(format!("actions_{actions}"), coverage),
                &goal,
                |b, goal| {
                    b.iter(|| planner.plan(black_box(&start), black_box(goal), &catalog));
                },
            );
        }
    }
    group.finish();
}

fn bench_admission(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut config = Config::default();
    config.coordinator.max_concurrent_tasks = 1;
    config.coordinator.max_queue_depth = usize::MAX;

    c.bench_function("coordinator/submit_queued", |b| {
        b.to_async(&runtime).iter_batched(
            || {
                let handlers = HandlerRegistry::builder()
                    .register(
                        "coverage-analysis",
                        Arc::new(SimulatedHandler::new(std::time::Duration::from_secs(60))),
                    )
                    .build();
                TaskCoordinator::builder(&config, handlers, Arc::new(EventBus::new(&config.event_bus)))
                    .build()
            },
            |coordinator| async move {
                for _ in 0..100 {
                    let request = TaskRequest::work(
                        "coverage-analysis",
                        "line-coverage",
                        serde_json::json!({}),
                    );
                    black_box(coordinator.submit_task(request)).ok();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_planning, bench_admission);
criterion_main!(benches);
