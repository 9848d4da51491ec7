//! Implementation of the `fleetcore init` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::setup::{create_config_dirs, create_config_file, SetupPaths};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub directories_created: Vec<String>,
    pub config_written: bool,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if self.config_written {
            lines.push("\nWrote .fleet/config.yaml".to_string());
        }
        lines.join("\n")
    }
}

pub fn execute(args: &InitArgs, json_mode: bool) -> Result<()> {
    let root = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };
    let paths = SetupPaths::new(&root);

    if paths.is_initialized() && !args.force {
        output(
            &InitOutput {
                success: false,
                message: "Project already initialized. Use --force to overwrite the config.".to_string(),
                initialized_path: root,
                directories_created: vec![],
                config_written: false,
            },
            json_mode,
        );
        return Ok(());
    }

    let directories_created = create_config_dirs(&paths)?
        .iter()
        .map(|dir| dir.strip_prefix(&root).unwrap_or(dir).display().to_string())
        .collect();
    let config_written = create_config_file(&paths, args.force)?;

    output(
        &InitOutput {
            success: true,
            message: if args.force {
                "Project reinitialized successfully.".to_string()
            } else {
                "Project initialized successfully.".to_string()
            },
            initialized_path: root,
            directories_created,
            config_written,
        },
        json_mode,
    );
    Ok(())
}
