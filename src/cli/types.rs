//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::config::ConfigArgs;
use super::commands::init::InitArgs;
use super::commands::plan::PlanArgs;

#[derive(Parser, Debug)]
#[command(name = "fleetcore")]
#[command(about = "Goal-oriented planning and task coordination for analysis domains", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .fleet/
    #[arg(short, long, global = true, env = "FLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to stdout
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .fleet/config.yaml with default settings
    Init(InitArgs),

    /// Inspect or validate the effective configuration
    Config(ConfigArgs),

    /// Plan toward a goal from a scenario file, optionally executing the plan
    Plan(PlanArgs),
}
