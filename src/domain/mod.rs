//! Domain layer for the fleet orchestration core
//!
//! Pure models (world state, actions, plans, tasks, events), the error
//! taxonomy and the port traits the coordinator depends on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    AdmissionError, BusError, CatalogError, CoordinatorError, ExecutionError, HandlerError,
    PlanningError, RebalanceError, TaskError,
};
