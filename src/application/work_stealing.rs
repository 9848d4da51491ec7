//! Work-stealing rebalancer.
//!
//! A background loop that periodically compares domain loads (queue depth
//! plus running) and, when the spread exceeds the configured threshold,
//! moves one queued task from the busiest domain to the least loaded one.
//! Failed cycles back off exponentially; after too many consecutive failures
//! the loop disables itself and reports so through [`RebalancerStatus`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::RebalanceError;
use crate::domain::models::config::WorkStealingConfig;
use crate::domain::models::event::LifecycleEvent;
use crate::domain::models::task::DomainId;
use crate::domain::ports::EventPublisher;

/// Load reported for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainLoad {
    pub domain: DomainId,
    pub queued: usize,
    pub running: usize,
}

impl DomainLoad {
    pub const fn load(&self) -> usize {
        self.queued + self.running
    }
}

/// A task moved between domain queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StolenTask {
    pub task_id: Uuid,
    pub from: DomainId,
    pub to: DomainId,
}

/// What the rebalancer needs from the coordinator.
pub trait RebalanceTarget: Send + Sync {
    /// Loads for every registered domain, sorted by domain name.
    fn domain_loads(&self) -> Vec<DomainLoad>;

    /// Atomically move the newest task in `from` that `to` can service.
    ///
    /// Returns `Ok(None)` when no queued task is eligible.
    fn steal_one(&self, from: &DomainId, to: &DomainId) -> Result<Option<StolenTask>, RebalanceError>;
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Spread within threshold, or fewer than two domains.
    Balanced,
    /// Imbalanced, but the idle domain could service nothing queued.
    NoEligibleTask,
    Moved(StolenTask),
}

/// Shared health of the rebalancer loop.
#[derive(Debug, Default)]
pub struct RebalancerStatus {
    running: AtomicBool,
    disabled: AtomicBool,
    consecutive_failures: AtomicU32,
    cycles: AtomicU64,
    moved: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Serializable snapshot of [`RebalancerStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalancerHealth {
    pub running: bool,
    pub disabled: bool,
    pub consecutive_failures: u32,
    pub cycles: u64,
    pub moved: u64,
    pub last_error: Option<String>,
}

impl RebalancerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self, outcome: &RebalanceOutcome) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if matches!(outcome, RebalanceOutcome::Moved(_)) {
            self.moved.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the new consecutive failure count.
    fn record_failure(&self, err: &RebalanceError) -> u32 {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RebalancerHealth {
        RebalancerHealth {
            running: self.running.load(Ordering::SeqCst),
            disabled: self.is_disabled(),
            consecutive_failures: self.consecutive_failures(),
            cycles: self.cycles.load(Ordering::Relaxed),
            moved: self.moved.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Periodic load balancer over a [`RebalanceTarget`].
pub struct WorkStealingRebalancer {
    config: WorkStealingConfig,
    target: Arc<dyn RebalanceTarget>,
    status: Arc<RebalancerStatus>,
    events: Option<Arc<dyn EventPublisher>>,
}

/// Handle to a running rebalancer loop.
pub struct RebalancerHandle {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl RebalancerHandle {
    /// Ask the loop to stop after the current cycle.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.stop.cancel();
        if let Err(err) = self.join.await {
            warn!(error = %err, "Rebalancer task ended abnormally");
        }
    }
}

impl WorkStealingRebalancer {
    pub fn new(
        config: WorkStealingConfig,
        target: Arc<dyn RebalanceTarget>,
        status: Arc<RebalancerStatus>,
        events: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        Self {
            config,
            target,
            status,
            events,
        }
    }

    pub fn status(&self) -> Arc<RebalancerStatus> {
        Arc::clone(&self.status)
    }

    /// Run a single balancing cycle.
    ///
    /// # Errors
    /// Propagates [`RebalanceError`] from the target.
    pub fn run_cycle(&self) -> Result<RebalanceOutcome, RebalanceError> {
        let loads = self.target.domain_loads();
        if loads.len() < 2 {
            return Ok(RebalanceOutcome::Balanced);
        }

        // First maximum and first minimum by name order.
        let (Some(busiest), Some(idlest)) = (
            loads
                .iter()
                .reduce(|best, l| if l.load() > best.load() { l } else { best }),
            loads.iter().min_by_key(|l| l.load()),
        ) else {
            return Ok(RebalanceOutcome::Balanced);
        };

        let spread = busiest.load() - idlest.load();
        if spread <= self.config.imbalance_threshold {
            return Ok(RebalanceOutcome::Balanced);
        }

        debug!(
            from = %busiest.domain,
            to = %idlest.domain,
            spread,
            "Domain loads imbalanced"
        );
        Ok(self
            .target
            .steal_one(&busiest.domain, &idlest.domain)?
            .map_or(RebalanceOutcome::NoEligibleTask, RebalanceOutcome::Moved))
    }

    /// Spawn the periodic loop.
    pub fn start(self) -> RebalancerHandle {
        let stop = CancellationToken::new();
        let join = tokio::spawn(self.run(stop.clone()));
        RebalancerHandle { stop, join }
    }

    async fn run(self, stop: CancellationToken) {
        let interval = self.config.interval();
        let mut backoff = self.backoff();
        let mut delay = interval;

        self.status.running.store(true, Ordering::SeqCst);
        info!(interval_ms = self.config.interval_ms, "Work-stealing rebalancer started");

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            match self.run_cycle() {
                Ok(outcome) => {
                    self.status.record_success(&outcome);
                    backoff.reset();
                    delay = interval;
                }
                Err(err) => {
                    let failures = self.status.record_failure(&err);
                    if failures >= self.config.max_consecutive_failures {
                        self.disable(failures, &err);
                        break;
                    }
                    delay = backoff.next_backoff().unwrap_or_else(|| self.config.max_backoff());
                    warn!(
                        error = %err,
                        consecutive_failures = failures,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Rebalance cycle failed"
                    );
                }
            }
        }

        self.status.running.store(false, Ordering::SeqCst);
        debug!("Work-stealing rebalancer stopped");
    }

    fn disable(&self, failures: u32, err: &RebalanceError) {
        self.status.disabled.store(true, Ordering::SeqCst);
        error!(
            consecutive_failures = failures,
            error = %err,
            "Disabling work-stealing rebalancer"
        );
        if let Some(events) = &self.events {
            events.publish(
                LifecycleEvent::RebalancerDisabled {
                    consecutive_failures: failures,
                    last_error: err.to_string(),
                }
                .into(),
            );
        }
    }

    /// Doubling delay starting at twice the interval, capped at `max_backoff`.
    fn backoff(&self) -> ExponentialBackoff {
        let max = self.config.max_backoff();
        let initial = (self.config.interval() * 2).min(max);
        ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(max)
            .with_max_elapsed_time(None::<Duration>)
            .build()
    }
}
