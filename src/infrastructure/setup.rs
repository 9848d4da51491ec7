//! Project initialization
//!
//! Creates the project-local `.fleet/` directory with a starter config file
//! that documents every setting and its default.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::config::loader::CONFIG_DIR;
use crate::domain::models::config::Config;

const CONFIG_HEADER: &str = "# Fleet configuration
# Override settings by editing this file, adding .fleet/local.yaml, or setting
# environment variables with the FLEET_ prefix and `__` between nested keys.
#
# Example environment variables:
#   export FLEET_COORDINATOR__MAX_CONCURRENT_TASKS=4
#   export FLEET_WORK_STEALING__ENABLED=false
#   export FLEET_LOGGING__LEVEL=debug

";

/// Paths touched by project initialization
#[derive(Debug, Clone)]
pub struct SetupPaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
}

impl SetupPaths {
    pub fn new(root: &Path) -> Self {
        let config_dir = root.join(CONFIG_DIR);
        Self {
            root: root.to_path_buf(),
            config_file: config_dir.join("config.yaml"),
            logs_dir: config_dir.join("logs"),
            config_dir,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file.exists()
    }
}

/// Render the default configuration as commented YAML.
pub fn default_config_yaml() -> Result<String> {
    let body = serde_yaml::to_string(&Config::default())
        .context("Failed to serialize default configuration")?;
    Ok(format!("{CONFIG_HEADER}{body}"))
}

/// Create `.fleet/` and `.fleet/logs/`. Returns the directories that were created.
pub fn create_config_dirs(paths: &SetupPaths) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in [&paths.config_dir, &paths.logs_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            created.push(dir.clone());
        }
    }
    Ok(created)
}

/// Write the default config file. Returns false if it exists and `force` is off.
pub fn create_config_file(paths: &SetupPaths, force: bool) -> Result<bool> {
    if paths.config_file.exists() && !force {
        return Ok(false);
    }
    fs::write(&paths.config_file, default_config_yaml()?)
        .context("Failed to write config file")?;
    Ok(true)
}
