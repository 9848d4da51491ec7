//! Implementation of the `fleetcore config` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::config::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all overrides
    Show {
        #[arg(long, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,
    },
    /// Check the effective configuration and report problems
    Validate,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    valid: bool,
    max_concurrent_tasks: usize,
    work_stealing: bool,
    failure_policy: &'static str,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid (max_concurrent_tasks={}, work_stealing={}, failure_policy={})",
            self.max_concurrent_tasks, self.work_stealing, self.failure_policy
        )
    }
}

pub fn execute(args: &ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => {
            let rendered = if json_mode || format == ConfigFormat::Json {
                serde_json::to_string_pretty(config)?
            } else {
                serde_yaml::to_string(config).context("Failed to render configuration")?
            };
            println!("{rendered}");
        }
        ConfigCommands::Validate => {
            ConfigLoader::validate(config)?;
            output(
                &ValidateOutput {
                    valid: true,
                    max_concurrent_tasks: config.coordinator.max_concurrent_tasks,
                    work_stealing: config.work_stealing.enabled,
                    failure_policy: config.executor.failure_policy.as_str(),
                },
                json_mode,
            );
        }
    }
    Ok(())
}
