//! Portfolio Engine Service Library
//!
//! Wires the engine crates into a running session for one user: configuration
//! loading, logging and metrics setup, signal handling, and the
//! `PortfolioSession` that owns the store, stream, refresher, reconciler and
//! order gateway.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod signals;

pub use config::{ServiceConfig, ENV_PREFIX};
pub use logging::initialize_logging_with_config;
pub use metrics::install_metrics_exporter;
pub use session::{PortfolioSession, SessionBackends, SessionStatus};
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(file: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(file).context("Failed to load service configuration")
}
