use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for the fleet core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Admission, queueing and history limits
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Goal-oriented planner limits
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Plan executor behaviour
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Work-stealing rebalancer
    #[serde(default)]
    pub work_stealing: WorkStealingConfig,

    /// Event bus capacities
    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Task coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    /// Maximum tasks in assigned or running state at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Maximum queued tasks per domain before submissions are rejected
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Timeout applied to every domain dispatch
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Maximum task trace contexts kept (oldest evicted first)
    #[serde(default = "default_task_trace_history_cap")]
    pub task_trace_history_cap: usize,

    /// Maximum retired tasks kept in the completed history
    #[serde(default = "default_completed_history_cap")]
    pub completed_history_cap: usize,

    /// Retired task ids remembered for idempotent cancels and late results
    #[serde(default = "default_retired_id_cap")]
    pub retired_id_cap: usize,
}

const fn default_max_concurrent_tasks() -> usize {
    8
}

const fn default_max_queue_depth() -> usize {
    1_000
}

const fn default_dispatch_timeout_ms() -> u64 {
    300_000
}

const fn default_task_trace_history_cap() -> usize {
    10_000
}

const fn default_completed_history_cap() -> usize {
    1_000
}

const fn default_retired_id_cap() -> usize {
    100_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_queue_depth: default_max_queue_depth(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            task_trace_history_cap: default_task_trace_history_cap(),
            completed_history_cap: default_completed_history_cap(),
            retired_id_cap: default_retired_id_cap(),
        }
    }
}

impl CoordinatorConfig {
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlannerConfig {
    /// Hard bound on node expansions per search
    #[serde(default = "default_max_plan_iterations")]
    pub max_plan_iterations: usize,
}

const fn default_max_plan_iterations() -> usize {
    10_000
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_plan_iterations: default_max_plan_iterations(),
        }
    }
}

/// What the executor does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and return a partial report
    #[default]
    Abort,
    /// Mark the step failed, leave state untouched, continue
    #[serde(alias = "skip-and-continue")]
    SkipAndContinue,
    /// Plan again from the live state toward the same goal
    Replan,
}

impl FailurePolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::SkipAndContinue => "skip_and_continue",
            Self::Replan => "replan",
        }
    }
}

/// Plan executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Upper bound on replans for one plan execution
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    /// Record world state before and after each step
    #[serde(default)]
    pub snapshot_states: bool,
}

const fn default_max_replans() -> u32 {
    3
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_replans: default_max_replans(),
            snapshot_states: false,
        }
    }
}

/// Work-stealing rebalancer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkStealingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base interval between cycles
    #[serde(default = "default_work_stealing_interval_ms")]
    pub interval_ms: u64,

    /// Minimum load difference (exclusive) before a task is moved
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: usize,

    /// Cap for the exponential backoff applied after failed cycles
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed cycles before the rebalancer disables itself
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

const fn default_true() -> bool {
    true
}

const fn default_work_stealing_interval_ms() -> u64 {
    5_000
}

const fn default_imbalance_threshold() -> usize {
    2
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

const fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for WorkStealingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_ms: default_work_stealing_interval_ms(),
            imbalance_threshold: default_imbalance_threshold(),
            max_backoff_ms: default_max_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl WorkStealingConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventBusConfig {
    /// Events retained in the ring-buffer history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Capacity of the broadcast stream for async consumers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_history_capacity() -> usize {
    1_000
}

const fn default_channel_capacity() -> usize {
    1_024
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Log file rotation policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}
