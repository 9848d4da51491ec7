//! Infrastructure layer module
//!
//! This module contains the process-level plumbing around the core:
//! - Configuration management (figment, YAML + env)
//! - Logging infrastructure (tracing)
//! - Project initialization

pub mod config;
pub mod logging;
pub mod setup;
