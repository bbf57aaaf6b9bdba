//! League Collector Service Library
//!
//! Configuration loading, logging setup, signal handling and the run loop
//! behind the `league-collector` binary.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::CollectorService;
pub use signals::setup_signal_handlers;

/// Load configuration from an optional file and the environment
pub fn load_configuration(file: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(file).context("Failed to load service configuration")
}
