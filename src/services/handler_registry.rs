//! Domain handler registry and the dispatch boundary.
//!
//! Handlers are registered per domain once at startup. Every call into a
//! handler goes through [`dispatch`], which applies the timeout and turns
//! handler errors and panics into [`ExecutionError`]s.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{ExecutionError, HandlerError};
use crate::domain::models::task::{DomainId, Task, TaskOutput};
use crate::domain::ports::DomainTaskHandler;

/// Immutable map from domain to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<DomainId, Arc<dyn DomainTaskHandler>>>,
}

/// Builder used to populate a [`HandlerRegistry`] at startup.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<DomainId, Arc<dyn DomainTaskHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register `handler` for `domain`, replacing any earlier registration.
    #[must_use]
    pub fn register(
        mut self,
        domain: impl Into<DomainId>,
        handler: Arc<dyn DomainTaskHandler>,
    ) -> Self {
        let domain = domain.into();
        if self.handlers.insert(domain.clone(), handler).is_some() {
            warn!(domain = %domain, "Replacing previously registered domain handler");
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        debug!(domains = self.handlers.len(), "Handler registry built");
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, domain: &str) -> Option<Arc<dyn DomainTaskHandler>> {
        self.handlers.get(domain).cloned()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.handlers.contains_key(domain)
    }

    /// Registered domains, sorted.
    pub fn domains(&self) -> Vec<DomainId> {
        let mut domains: Vec<DomainId> = self.handlers.keys().cloned().collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("domains", &self.domains())
            .finish()
    }
}

/// Run `task` on `handler` with a timeout.
///
/// The handler runs in its own spawned task so that a panic is captured as a
/// `JoinError` instead of unwinding into the caller. On timeout the
/// cancellation token is fired as a best-effort stop signal; the handler is
/// not forcibly aborted.
///
/// # Errors
/// - [`ExecutionError::Timeout`] when `timeout` elapses first
/// - [`ExecutionError::HandlerFailed`] when the handler errors or panics
/// - [`ExecutionError::Cancelled`] when the handler reports cancellation
pub async fn dispatch(
    handler: Arc<dyn DomainTaskHandler>,
    task: Task,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<TaskOutput, ExecutionError> {
    let domain = task.assigned_domain.to_string();
    let signal = cancel.clone();
    let mut join = tokio::spawn(async move { handler.execute(&task, cancel).await });

    match tokio::time::timeout(timeout, &mut join).await {
        Err(_) => {
            signal.cancel();
            warn!(domain = %domain, timeout_ms = timeout.as_millis(), "Domain dispatch timed out");
            Err(ExecutionError::timeout(domain, timeout))
        }
        Ok(Err(join_err)) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic());
            warn!(domain = %domain, panic = %message, "Domain handler panicked");
            Err(ExecutionError::handler_failed(domain, format!("handler panicked: {message}")))
        }
        Ok(Err(_)) => Err(ExecutionError::Cancelled),
        Ok(Ok(Err(HandlerError::Cancelled))) => Err(ExecutionError::Cancelled),
        Ok(Ok(Err(HandlerError::Failed(message)))) => {
            Err(ExecutionError::handler_failed(domain, message))
        }
        Ok(Ok(Ok(output))) => Ok(output),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskRequest;
    use async_trait::async_trait;

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
        HonourCancel,
    }

    struct ScriptedHandler(Behaviour);

    #[async_trait]
    impl DomainTaskHandler for ScriptedHandler {
        async fn execute(
            &self,
            task: &Task,
            cancel: CancellationToken,
        ) -> Result<TaskOutput, HandlerError> {
            match &self.0 {
                Behaviour::Succeed => Ok(TaskOutput::new(serde_json::json!({"type": task.task_type}))),
                Behaviour::Fail => Err(HandlerError::failed("analysis crashed")),
                Behaviour::Panic => panic!("handler bug"),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(TaskOutput::empty())
                }
                Behaviour::HonourCancel => {
                    cancel.cancelled().await;
                    Err(HandlerError::Cancelled)
                }
            }
        }
    }

    fn task() -> Task {
        Task::from_request(TaskRequest::work("coverage-analysis", "scan", serde_json::json!({})))
    }

    async fn run(behaviour: Behaviour, timeout: Duration) -> Result<TaskOutput, ExecutionError> {
        dispatch(
            Arc::new(ScriptedHandler(behaviour)),
            task(),
            CancellationToken::new(),
            timeout,
        )
        .await
    }

    #[tokio::test]
    async fn test_success_passes_output_through() {
        let output = run(Behaviour::Succeed, Duration::from_secs(1)).await.unwrap();
        assert_eq!(output.data["type"], "scan");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_handler_failed() {
        let err = run(Behaviour::Fail, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::handler_failed("coverage-analysis", "analysis crashed")
        );
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let err = run(Behaviour::Panic, Duration::from_secs(1)).await.unwrap_err();
        match err {
            ExecutionError::HandlerFailed { message, .. } => assert!(message.contains("handler bug")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wins_over_slow_handler() {
        let err = run(Behaviour::Sleep(Duration::from_millis(50)), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_cancel_token() {
        let token = CancellationToken::new();
        let err = dispatch(
            Arc::new(ScriptedHandler(Behaviour::HonourCancel)),
            task(),
            token.clone(),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_registry_lookup_and_sorted_domains() {
        let registry = HandlerRegistry::builder()
            .register("security-scanning", Arc::new(ScriptedHandler(Behaviour::Succeed)))
            .register("coverage-analysis", Arc::new(ScriptedHandler(Behaviour::Succeed)))
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("coverage-analysis"));
        assert!(registry.get("unknown").is_none());
        assert_eq!(
            registry.domains(),
            vec![DomainId::from("coverage-analysis"), DomainId::from("security-scanning")]
        );
    }
}
