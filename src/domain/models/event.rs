//! Event envelope carried by the cross-domain event bus.
//!
//! `BusEvent` is the untyped envelope every subscriber sees; `LifecycleEvent`
//! is the typed set of events the core itself emits. Each lifecycle variant
//! converts into an envelope with a dotted type name such as `task.queued`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::goal::Goal;
use super::task::{DomainId, TaskStatus};

/// Dotted event type names emitted by the core.
pub mod event_types {
    pub const TASK_QUEUED: &str = "task.queued";
    pub const TASK_ASSIGNED: &str = "task.assigned";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_CANCELLED: &str = "task.cancelled";
    pub const DOMAIN_REBALANCED: &str = "domain.rebalanced";
    pub const REBALANCER_DISABLED: &str = "rebalancer.disabled";
    pub const PLAN_CREATED: &str = "plan.created";
    pub const PLAN_STEP_COMPLETED: &str = "plan.step.completed";
    pub const PLAN_STEP_FAILED: &str = "plan.step.failed";
    pub const PLAN_REPLANNED: &str = "plan.replanned";
    pub const GOAL_CHANGED: &str = "goal.changed";
    /// Subscribing to this type receives every event.
    pub const WILDCARD: &str = "*";
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Envelope published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: Uuid,
    /// Assigned by the bus on publish.
    pub sequence: u64,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub source: Option<DomainId>,
    pub task_id: Option<Uuid>,
    /// Set on requests awaiting a correlated response.
    pub correlation_id: Option<Uuid>,
    /// Set on responses; names the request's correlation id.
    pub reply_to: Option<Uuid>,
    pub payload: serde_json::Value,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            event_type: event_type.into(),
            timestamp: Utc::now(),
            severity: EventSeverity::Info,
            source: None,
            task_id: None,
            correlation_id: None,
            reply_to: None,
            payload,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<DomainId>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub const fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    #[must_use]
    pub const fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub const fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Build a response to `request`, carrying its correlation id in `reply_to`.
    pub fn reply(
        request: &Self,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let mut event = Self::new(event_type, payload);
        event.reply_to = request.correlation_id;
        event.task_id = request.task_id;
        event
    }
}

/// Typed events emitted by the coordinator, executor and rebalancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TaskQueued {
        task_id: Uuid,
        domain: DomainId,
        queue_depth: usize,
    },
    TaskAssigned {
        task_id: Uuid,
        domain: DomainId,
    },
    TaskStarted {
        task_id: Uuid,
        domain: DomainId,
    },
    TaskCompleted {
        task_id: Uuid,
        domain: DomainId,
        latency_ms: Option<i64>,
    },
    TaskFailed {
        task_id: Uuid,
        domain: DomainId,
        error_kind: String,
        error: String,
    },
    TaskCancelled {
        task_id: Uuid,
        domain: DomainId,
        previous_status: TaskStatus,
    },
    DomainRebalanced {
        task_id: Uuid,
        from: DomainId,
        to: DomainId,
    },
    RebalancerDisabled {
        consecutive_failures: u32,
        last_error: String,
    },
    PlanCreated {
        task_id: Option<Uuid>,
        goal: String,
        steps: Vec<String>,
        total_cost: f64,
    },
    PlanStepCompleted {
        task_id: Option<Uuid>,
        step: usize,
        action: String,
        domain: DomainId,
    },
    PlanStepFailed {
        task_id: Option<Uuid>,
        step: usize,
        action: String,
        error: String,
    },
    PlanReplanned {
        task_id: Option<Uuid>,
        reason: String,
        replans: u32,
    },
    GoalChanged {
        task_id: Uuid,
        goal: Goal,
    },
}

impl LifecycleEvent {
    pub const fn event_type(&self) -> &'static str {
        use event_types as t;
        match self {
            Self::TaskQueued { .. } => t::TASK_QUEUED,
            Self::TaskAssigned { .. } => t::TASK_ASSIGNED,
            Self::TaskStarted { .. } => t::TASK_STARTED,
            Self::TaskCompleted { .. } => t::TASK_COMPLETED,
            Self::TaskFailed { .. } => t::TASK_FAILED,
            Self::TaskCancelled { .. } => t::TASK_CANCELLED,
            Self::DomainRebalanced { .. } => t::DOMAIN_REBALANCED,
            Self::RebalancerDisabled { .. } => t::REBALANCER_DISABLED,
            Self::PlanCreated { .. } => t::PLAN_CREATED,
            Self::PlanStepCompleted { .. } => t::PLAN_STEP_COMPLETED,
            Self::PlanStepFailed { .. } => t::PLAN_STEP_FAILED,
            Self::PlanReplanned { .. } => t::PLAN_REPLANNED,
            Self::GoalChanged { .. } => t::GOAL_CHANGED,
        }
    }

    const fn severity(&self) -> EventSeverity {
        match self {
            Self::TaskFailed { .. } | Self::RebalancerDisabled { .. } => EventSeverity::Error,
            Self::PlanStepFailed { .. } | Self::PlanReplanned { .. } => EventSeverity::Warning,
            Self::TaskAssigned { .. } | Self::TaskStarted { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    const fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::TaskQueued { task_id, .. }
            | Self::TaskAssigned { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskCancelled { task_id, .. }
            | Self::DomainRebalanced { task_id, .. }
            | Self::GoalChanged { task_id, .. } => Some(*task_id),
            Self::PlanCreated { task_id, .. }
            | Self::PlanStepCompleted { task_id, .. }
            | Self::PlanStepFailed { task_id, .. }
            | Self::PlanReplanned { task_id, .. } => *task_id,
            Self::RebalancerDisabled { .. } => None,
        }
    }

    fn source(&self) -> Option<DomainId> {
        match self {
            Self::TaskQueued { domain, .. }
            | Self::TaskAssigned { domain, .. }
            | Self::TaskStarted { domain, .. }
            | Self::TaskCompleted { domain, .. }
            | Self::TaskFailed { domain, .. }
            | Self::TaskCancelled { domain, .. }
            | Self::PlanStepCompleted { domain, .. } => Some(domain.clone()),
            Self::DomainRebalanced { to, .. } => Some(to.clone()),
            _ => None,
        }
    }
}

impl From<LifecycleEvent> for BusEvent {
    fn from(event: LifecycleEvent) -> Self {
        let payload = serde_json::to_value(&event)
            .ok()
            .and_then(|v| v.get("data").cloned())
            .unwrap_or(serde_json::Value::Null);

        let mut envelope = Self::new(event.event_type(), payload).with_severity(event.severity());
        envelope.task_id = event.task_id();
        envelope.source = event.source();
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_conversion_sets_envelope_fields() {
        let task_id = Uuid::new_v4();
        let event: BusEvent = LifecycleEvent::TaskFailed {
            task_id,
            domain: DomainId::from("coverage-analysis"),
            error_kind: "timeout".to_string(),
            error: "slow".to_string(),
        }
        .into();

        assert_eq!(event.event_type, event_types::TASK_FAILED);
        assert_eq!(event.severity, EventSeverity::Error);
        assert_eq!(event.task_id, Some(task_id));
        assert_eq!(event.source.as_ref().map(DomainId::as_str), Some("coverage-analysis"));
        assert_eq!(event.payload["error_kind"], "timeout");
    }

    #[test]
    fn test_rebalanced_source_is_destination() {
        let event: BusEvent = LifecycleEvent::DomainRebalanced {
            task_id: Uuid::new_v4(),
            from: DomainId::from("a"),
            to: DomainId::from("b"),
        }
        .into();
        assert_eq!(event.event_type, "domain.rebalanced");
        assert_eq!(event.source, Some(DomainId::from("b")));
        assert_eq!(event.payload["from"], "a");
    }

    #[test]
    fn test_reply_carries_correlation() {
        let correlation = Uuid::new_v4();
        let request = BusEvent::new("coverage.query", serde_json::json!({}))
            .with_correlation(correlation);
        let response = BusEvent::reply(&request, "coverage.result", serde_json::json!({"line": 80}));
        assert_eq!(response.reply_to, Some(correlation));
        assert!(response.correlation_id.is_none());
    }
}
