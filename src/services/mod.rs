pub mod cost_model;
pub mod event_bus;
pub mod handler_registry;
pub mod plan_executor;
pub mod planner;
pub mod ring_buffer;

pub use cost_model::{ActionStats, CostModel};
pub use event_bus::{EventBus, Subscription};
pub use handler_registry::{dispatch, HandlerRegistry, HandlerRegistryBuilder};
pub use plan_executor::{
    ExecutionOptions, ExecutionReport, ExecutionStatus, PlanExecutor, StepRecord, StepStatus,
};
pub use planner::GoalPlanner;
pub use ring_buffer::RingBuffer;
