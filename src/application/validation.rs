//! Admission checks applied by `submit_task` before a task is registered.

use crate::domain::errors::{AdmissionError, AdmissionResult};
use crate::domain::models::task::{TaskKind, TaskRequest};
use crate::services::HandlerRegistry;

/// Validate a task request against the registered domains.
///
/// # Errors
/// Returns [`AdmissionError::ValidationError`] naming the first problem found.
pub fn validate_request(
    request: &TaskRequest,
    handlers: &HandlerRegistry,
    planning_enabled: bool,
) -> AdmissionResult<()> {
    let domain = request.domain.as_str();
    if domain.trim().is_empty() {
        return Err(invalid("domain must not be empty"));
    }
    if !handlers.contains(domain) {
        return Err(invalid(format!("no handler registered for domain '{domain}'")));
    }
    if request.task_type.trim().is_empty() {
        return Err(invalid("task_type must not be empty"));
    }

    match &request.kind {
        TaskKind::Work { payload } if !(payload.is_object() || payload.is_null()) => {
            Err(invalid("payload must be a JSON object"))
        }
        TaskKind::Plan { .. } if !planning_enabled => {
            Err(invalid("planned tasks require an action catalog and state source"))
        }
        TaskKind::Plan { goal } if goal.conditions.is_empty() => Err(invalid(format!(
            "goal '{}' has no conditions",
            goal.name
        ))),
        _ => Ok(()),
    }
}

fn invalid(reason: impl Into<String>) -> AdmissionError {
    AdmissionError::ValidationError(reason.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::errors::HandlerError;
    use crate::domain::models::action::Condition;
    use crate::domain::models::goal::Goal;
    use crate::domain::models::task::{Task, TaskOutput};
    use crate::domain::models::world_state::Metric;
    use crate::domain::ports::DomainTaskHandler;

    struct Noop;

    #[async_trait]
    impl DomainTaskHandler for Noop {
        async fn execute(&self, _: &Task, _: CancellationToken) -> Result<TaskOutput, HandlerError> {
            Ok(TaskOutput::empty())
        }
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::builder()
            .register("coverage-analysis", Arc::new(Noop))
            .build()
    }

    fn reason(result: AdmissionResult<()>) -> String {
        match result {
            Err(AdmissionError::ValidationError(reason)) => reason,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_accepts_well_formed_work() {
        let request = TaskRequest::work("coverage-analysis", "scan", json!({"path": "src"}));
        assert!(validate_request(&request, &registry(), false).is_ok());

        let request = TaskRequest::work("coverage-analysis", "scan", serde_json::Value::Null);
        assert!(validate_request(&request, &registry(), false).is_ok());
    }

    #[test]
    fn test_rejects_unknown_domain() {
        let request = TaskRequest::work("chaos", "scan", json!({}));
        assert!(reason(validate_request(&request, &registry(), false)).contains("chaos"));
    }

    #[test]
    fn test_rejects_blank_fields_and_scalar_payload() {
        let request = TaskRequest::work("", "scan", json!({}));
        assert!(reason(validate_request(&request, &registry(), false)).contains("domain"));

        let request = TaskRequest::work("coverage-analysis", "  ", json!({}));
        assert!(reason(validate_request(&request, &registry(), false)).contains("task_type"));

        let request = TaskRequest::work("coverage-analysis", "scan", json!(42));
        assert!(reason(validate_request(&request, &registry(), false)).contains("payload"));
    }

    #[test]
    fn test_planned_tasks_need_planning_and_conditions() {
        let goal = Goal::new("coverage").require(Condition::at_least(Metric::LineCoverage, 80.0));
        let request = TaskRequest::plan("coverage-analysis", goal);
        assert!(reason(validate_request(&request, &registry(), false)).contains("action catalog"));
        assert!(validate_request(&request, &registry(), true).is_ok());

        let request = TaskRequest::plan("coverage-analysis", Goal::new("empty"));
        assert!(reason(validate_request(&request, &registry(), true)).contains("no conditions"));
    }
}
