pub mod coordinator_context;
pub mod task_coordinator;
pub mod validation;
pub mod work_stealing;

pub use coordinator_context::{TaskTrace, TraceEntry};
pub use task_coordinator::{
    CoordinatorHealth, CoordinatorMetrics, DomainHealth, PlanningSupport, TaskCoordinator,
    TaskCoordinatorBuilder, TaskHandle,
};
pub use validation::validate_request;
pub use work_stealing::{
    DomainLoad, RebalanceOutcome, RebalanceTarget, RebalancerHandle, RebalancerHealth,
    RebalancerStatus, StolenTask, WorkStealingRebalancer,
};
