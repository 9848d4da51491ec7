//! fleetcore - goal-oriented planning and task coordination for analysis domains
//!
//! A fleet of analysis domains (test generation, coverage analysis, security
//! scanning, ...) receives work through a single [`TaskCoordinator`]. The
//! coordinator bounds concurrency, queues per domain, rebalances queued work
//! between domains and runs goal-directed tasks by planning with A* over a
//! catalog of actions and executing the plan step by step.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the ports handlers and stores implement
//! - **Service Layer** (`services`): Planner, plan executor, event bus, handler registry
//! - **Application Layer** (`application`): Task coordinator and work-stealing rebalancer
//! - **Adapters** (`adapters`): In-memory history store and world state, simulated handler
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging, project setup
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetcore::{Config, EventBus, HandlerRegistry, TaskCoordinator, TaskRequest};
//! use fleetcore::adapters::SimulatedHandler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let handlers = HandlerRegistry::builder()
//!         .register("coverage-analysis", Arc::new(SimulatedHandler::default()))
//!         .build();
//!     let bus = EventBus::new(&config.event_bus);
//!     let coordinator = TaskCoordinator::builder(&config, handlers, Arc::new(bus)).build();
//!
//!     coordinator.submit_task(TaskRequest::work(
//!         "coverage-analysis",
//!         "line-coverage",
//!         serde_json::json!({}),
//!     ))?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{
    CoordinatorHealth, CoordinatorMetrics, RebalancerHandle, TaskCoordinator, TaskHandle,
    WorkStealingRebalancer,
};
pub use domain::errors::{
    AdmissionError, BusError, CoordinatorError, ExecutionError, HandlerError, PlanningError,
    RebalanceError,
};
pub use domain::models::{
    Action, ActionCatalog, BusEvent, Condition, Config, Effect, Goal, Metric, Plan, Task,
    TaskOutput, TaskRequest, TaskStatus, WorldState,
};
pub use domain::ports::{DomainTaskHandler, EventPublisher, HistoryStore, StateSource};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EventBus, GoalPlanner, HandlerRegistry, PlanExecutor};
