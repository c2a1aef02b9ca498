//! Prometheus exporter for the engine counters

use crate::config::MetricsConfig;
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Install the exporter when enabled. Counters recorded before this call are
/// dropped by the no-op recorder.
pub fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config.listen_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
