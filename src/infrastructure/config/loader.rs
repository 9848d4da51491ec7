use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding project configuration, relative to the working directory.
pub const CONFIG_DIR: &str = ".fleet";

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "FLEET_";

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {0}: must be at least 1")]
    ZeroValue(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error(
        "Invalid backoff configuration: interval_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .fleet/config.yaml (project config)
    /// 3. .fleet/local.yaml (local overrides, optional)
    /// 4. Environment variables (FLEET_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration rooted at `root` instead of the current directory.
    pub fn load_from(root: &Path) -> Result<Config> {
        let dir = root.join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let coordinator = &config.coordinator;
        let work_stealing = &config.work_stealing;

        let caps: [(&'static str, u64); 13] = [
            ("coordinator.max_concurrent_tasks", coordinator.max_concurrent_tasks as u64),
            ("coordinator.max_queue_depth", coordinator.max_queue_depth as u64),
            ("coordinator.dispatch_timeout_ms", coordinator.dispatch_timeout_ms),
            ("coordinator.task_trace_history_cap", coordinator.task_trace_history_cap as u64),
            ("coordinator.completed_history_cap", coordinator.completed_history_cap as u64),
            ("coordinator.retired_id_cap", coordinator.retired_id_cap as u64),
            ("planner.max_plan_iterations", config.planner.max_plan_iterations as u64),
            ("work_stealing.interval_ms", work_stealing.interval_ms),
            ("work_stealing.imbalance_threshold", work_stealing.imbalance_threshold as u64),
            ("work_stealing.max_backoff_ms", work_stealing.max_backoff_ms),
            (
                "work_stealing.max_consecutive_failures",
                u64::from(work_stealing.max_consecutive_failures),
            ),
            ("event_bus.history_capacity", config.event_bus.history_capacity as u64),
            ("event_bus.channel_capacity", config.event_bus.channel_capacity as u64),
        ];
        if let Some((field, _)) = caps.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue(*field));
        }

        if work_stealing.interval_ms > work_stealing.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                work_stealing.interval_ms,
                work_stealing.max_backoff_ms,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if let Some(dir) = &config.logging.log_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "logging.log_dir cannot be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
