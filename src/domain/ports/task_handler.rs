use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::HandlerError;
use crate::domain::models::task::{Task, TaskOutput};

/// Port for the analysis logic behind one domain
///
/// The coordinator depends only on this shape. Handlers never reference the
/// coordinator or each other; cross-domain signalling goes through the event
/// bus.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use fleetcore::domain::errors::HandlerError;
/// use fleetcore::domain::models::{Task, TaskOutput};
/// use fleetcore::domain::ports::DomainTaskHandler;
/// use tokio_util::sync::CancellationToken;
///
/// struct CoverageHandler;
///
/// #[async_trait]
/// impl DomainTaskHandler for CoverageHandler {
///     async fn execute(
///         &self,
///         task: &Task,
///         cancel: CancellationToken,
///     ) -> Result<TaskOutput, HandlerError> {
///         if cancel.is_cancelled() {
///             return Err(HandlerError::Cancelled);
///         }
///         Ok(TaskOutput::new(serde_json::json!({ "task_type": task.task_type })))
///     }
/// }
/// ```
#[async_trait]
pub trait DomainTaskHandler: Send + Sync {
    /// Perform the task's work
    ///
    /// Cancellation is cooperative: implementations should check `cancel` at
    /// their own checkpoints and return [`HandlerError::Cancelled`] when it
    /// fires. The coordinator also fires the token when a dispatch times out.
    ///
    /// # Errors
    /// Returns [`HandlerError`] when the work fails. Panics are caught at the
    /// dispatch boundary and reported as handler failures.
    async fn execute(&self, task: &Task, cancel: CancellationToken)
        -> Result<TaskOutput, HandlerError>;

    /// Whether this handler can take over `task` from another domain
    ///
    /// Consulted by the work-stealing rebalancer. Defaults to `false`, so a
    /// domain only receives stolen work when it opts in.
    fn can_service(&self, _task: &Task) -> bool {
        false
    }
}
