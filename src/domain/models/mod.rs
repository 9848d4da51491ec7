pub mod action;
pub mod config;
pub mod event;
pub mod goal;
pub mod plan;
pub mod task;
pub mod world_state;

pub use action::{Action, ActionCatalog, Condition, Effect};
pub use config::{
    Config, CoordinatorConfig, EventBusConfig, ExecutorConfig, FailurePolicy, LogFormat,
    LoggingConfig, PlannerConfig, RotationPolicy, WorkStealingConfig,
};
pub use event::{event_types, BusEvent, EventSeverity, LifecycleEvent};
pub use goal::Goal;
pub use plan::{Plan, SimulationFailure};
pub use task::{DomainId, Task, TaskKind, TaskOutput, TaskPriority, TaskRequest, TaskStatus};
pub use world_state::{Environment, Metric, StateKey, WorldState};
