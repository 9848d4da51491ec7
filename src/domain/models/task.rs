//! Task domain model.
//!
//! Tasks are units of work dispatched to analysis domains. Their status is the
//! coordinator's principal state machine:
//!
//! ```text
//! queued -> assigned -> running -> completed | failed | cancelled
//!    \________\___________\_____________________/ (cancel)
//! ```

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::goal::Goal;
use crate::domain::errors::TaskError;

/// Name of an analysis domain ("test-generation", "coverage-analysis", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    pub const TEST_GENERATION: &'static str = "test-generation";
    pub const COVERAGE_ANALYSIS: &'static str = "coverage-analysis";
    pub const SECURITY_SCANNING: &'static str = "security-scanning";
    pub const QUALITY_ASSESSMENT: &'static str = "quality-assessment";
    pub const DEFECT_INTELLIGENCE: &'static str = "defect-intelligence";
    pub const LEARNING_OPTIMIZATION: &'static str = "learning-optimization";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DomainId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for DomainId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Status of a task in the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in a domain queue for a free slot
    #[default]
    Queued,
    /// Holds a slot, dispatch not yet started
    Assigned,
    /// Handler is executing
    Running,
    /// Handler returned successfully
    Completed,
    /// Handler failed, timed out or panicked
    Failed,
    /// Cancelled by a caller
    Cancelled,
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "assigned" => Some(Self::Assigned),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a task in this state occupies one of the concurrency slots.
    pub const fn holds_slot(&self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Queued => vec![Self::Assigned, Self::Cancelled],
            Self::Assigned => vec![Self::Running, Self::Failed, Self::Cancelled],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority level for tasks. Breaks ties between domain queue heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl TaskPriority {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// What a task asks the fleet to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Opaque work handed straight to the domain handler.
    Work { payload: serde_json::Value },
    /// Plan toward a goal, then execute the plan step by step.
    Plan { goal: Goal },
}

/// Caller-facing description of a task to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub domain: DomainId,
    pub task_type: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
}

impl TaskRequest {
    pub fn work(
        domain: impl Into<DomainId>,
        task_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            domain: domain.into(),
            task_type: task_type.into(),
            kind: TaskKind::Work { payload },
            priority: TaskPriority::default(),
            retries: 0,
            correlation_id: None,
        }
    }

    pub fn plan(domain: impl Into<DomainId>, goal: Goal) -> Self {
        Self {
            domain: domain.into(),
            task_type: "plan".to_string(),
            kind: TaskKind::Plan { goal },
            priority: TaskPriority::default(),
            retries: 0,
            correlation_id: None,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Result returned by a domain handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskOutput {
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskOutput {
    pub const fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            message: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A unit of work tracked by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Domain the task was submitted to.
    pub domain: DomainId,
    pub task_type: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Domain currently responsible; differs from `domain` after work stealing.
    pub assigned_domain: DomainId,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal error summary for failed tasks.
    pub error: Option<String>,
    pub output: Option<TaskOutput>,
    pub correlation_id: Option<Uuid>,
}

impl Task {
    pub fn from_request(request: TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            assigned_domain: request.domain.clone(),
            domain: request.domain,
            task_type: request.task_type,
            kind: request.kind,
            status: TaskStatus::Queued,
            priority: request.priority,
            retries: request.retries,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            output: None,
            correlation_id: request.correlation_id,
        }
    }

    /// Move to `to`, stamping timestamps. Rejects transitions outside the state machine.
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(to) {
            return Err(TaskError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        let now = Utc::now();
        self.status = to;
        self.updated_at = now;
        if to == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub const fn is_planned(&self) -> bool {
        matches!(self.kind, TaskKind::Plan { .. })
    }

    /// Wall time from submission to completion, if finished.
    pub fn latency_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds())
    }
}
