//! Stand-in domain handler for dry runs and demos.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::HandlerError;
use crate::domain::models::task::{Task, TaskOutput};
use crate::domain::ports::DomainTaskHandler;

/// Succeeds after a fixed delay without doing any real work.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedHandler {
    delay: Duration,
}

impl SimulatedHandler {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DomainTaskHandler for SimulatedHandler {
    async fn execute(&self, task: &Task, cancel: CancellationToken) -> Result<TaskOutput, HandlerError> {
        tokio::select! {
            () = cancel.cancelled() => Err(HandlerError::Cancelled),
            () = tokio::time::sleep(self.delay) => {
                debug!(task_id = %task.id, domain = %task.assigned_domain, "Simulated task finished");
                Ok(TaskOutput {
                    data: json!({
                        "simulated": true,
                        "domain": task.assigned_domain,
                        "task_type": task.task_type,
                    }),
                    message: Some(format!("simulated {}", task.task_type)),
                })
            }
        }
    }

    fn can_service(&self, _task: &Task) -> bool {
        true
    }
}
