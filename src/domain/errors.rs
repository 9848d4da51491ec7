//! Domain errors for the fleet orchestration core.
//!
//! Every failure class the coordinator can observe has its own enum so that
//! callers can match on outcomes instead of parsing messages. None of these
//! are ever thrown across the coordinator boundary as panics.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures of the goal-oriented planner.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanningError {
    #[error("No plan found for goal '{goal}' after expanding {expanded} nodes")]
    NoPlanFound { goal: String, expanded: usize },

    #[error("Planner exceeded the iteration cap of {cap} node expansions for goal '{goal}'")]
    IterationCapExceeded { goal: String, cap: usize },
}

/// Domain-level errors for task state changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// Rejections while building an action catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Invalid action '{action}': {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("Duplicate action name: {0}")]
    DuplicateAction(String),
}

/// Failures returned synchronously by `submit_task`.
///
/// Backpressure is not an error: a saturated fleet simply queues the task.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdmissionError {
    #[error("Queue for domain '{domain}' is full ({capacity} tasks)")]
    QueueFull { domain: String, capacity: usize },

    #[error("Task validation failed: {0}")]
    ValidationError(String),
}

/// Failures of a single dispatch to a domain handler or of a plan step.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("Preconditions of action '{action}' no longer hold: {unmet:?}")]
    PreconditionViolated { action: String, unmet: Vec<String> },

    #[error("Handler for domain '{domain}' failed: {message}")]
    HandlerFailed { domain: String, message: String },

    #[error("Dispatch to domain '{domain}' timed out after {timeout_ms}ms")]
    Timeout { domain: String, timeout_ms: u64 },

    #[error("Execution was cancelled")]
    Cancelled,

    #[error("Planning failed: {0}")]
    Planning(PlanningError),
}

impl ExecutionError {
    pub fn handler_failed(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            domain: domain.into(),
            message: message.into(),
        }
    }

    pub fn timeout(domain: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            domain: domain.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Short machine-friendly label used in events and error summaries.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PreconditionViolated { .. } => "precondition_violated",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Planning(_) => "planning_failed",
        }
    }
}

/// Error returned by a domain task handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    /// The handler observed its cancellation token and stopped early.
    #[error("Handler stopped after cancellation")]
    Cancelled,
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

/// Failure of one work-stealing cycle. Never fails a task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RebalanceError {
    #[error("Rebalance cycle failed: {0}")]
    CycleFailed(String),
}

/// Lookup failures on the coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("No plan is executing for task {0}")]
    NoActivePlan(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TaskError),
}

/// Failures of the event bus request/response helper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("No response for correlation {correlation_id} within {timeout_ms}ms")]
    Timeout { correlation_id: Uuid, timeout_ms: u64 },

    #[error("Request {0} was cancelled because the bus was disposed")]
    Cancelled(Uuid),

    #[error("Event bus has been disposed")]
    Disposed,
}

pub type PlanningResult<T> = Result<T, PlanningError>;
pub type AdmissionResult<T> = Result<T, AdmissionError>;
