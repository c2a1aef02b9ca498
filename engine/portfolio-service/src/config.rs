//! Service configuration management

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File};
use execution_reconciler::ReconcilerConfig;
use market_stream::StreamConfig;
use order_gateway::OrderGatewayConfig;
use portfolio_types::InstrumentCatalog;
use serde::{Deserialize, Serialize};
use snapshot_loader::SnapshotConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use valuation_store::StoreConfig;

/// Prefix for environment overrides, e.g. `PORTFOLIO__ORDERS__SUBMISSION_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "PORTFOLIO";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Request/response backend (snapshots and orders)
    pub backend: BackendSettings,

    /// Market channel subscription
    pub stream: StreamConfig,

    /// Valuation Store
    pub store: StoreConfig,

    /// Order submission
    pub orders: OrderGatewayConfig,

    /// Execution reconciliation
    pub reconciler: ReconcilerConfig,

    /// Instrument catalog source
    pub catalog: CatalogSettings,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the portfolio API
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// TOML file with `[[instruments]]` entries
    pub path: PathBuf,

    /// Fail startup when the file is missing instead of accepting every id
    pub required: bool,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// How long one-shot commands wait for a first price, in seconds
    pub price_wait_secs: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Log file path (if None, logs to stdout)
    pub file: Option<PathBuf>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter
    pub enabled: bool,

    /// Listen address of the exporter
    pub listen: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000".to_string(), request_timeout_secs: 30 }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self { path: PathBuf::from("config/catalog.toml"), required: false }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { price_wait_secs: 15, shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, listen: "127.0.0.1:9090".to_string() }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ServiceSettings {
    pub fn price_wait(&self) -> Duration {
        Duration::from_secs(self.price_wait_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().with_context(|| format!("Invalid metrics listen address: {}", self.listen))
    }
}

impl ServiceConfig {
    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            base_url: self.backend.base_url.clone(),
            request_timeout_secs: self.backend.request_timeout_secs,
        }
    }

    /// Load the instrument catalog, falling back to a permissive one when the
    /// file is optional and absent
    pub fn load_catalog(&self) -> Result<InstrumentCatalog> {
        let path = &self.catalog.path;
        if !path.exists() && !self.catalog.required {
            tracing::warn!("Catalog {:?} not found; accepting every instrument id", path);
            return Ok(InstrumentCatalog::permissive());
        }
        InstrumentCatalog::load(path).with_context(|| format!("Failed to load catalog {:?}", path))
    }
}

/// Load configuration: defaults, then an optional TOML file, then environment
pub fn load_config(file: Option<&Path>) -> Result<ServiceConfig> {
    let mut builder = Config::builder();

    if let Some(path) = file {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__").try_parsing(true),
    );

    let config: ServiceConfig = builder
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    let base = Url::parse(&config.backend.base_url)
        .with_context(|| format!("Invalid backend URL: {}", config.backend.base_url))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow!("Backend URL must be http(s): {}", config.backend.base_url));
    }

    let stream = Url::parse(&config.stream.url)
        .with_context(|| format!("Invalid stream URL: {}", config.stream.url))?;
    if !matches!(stream.scheme(), "ws" | "wss") {
        return Err(anyhow!("Stream URL must be ws(s): {}", config.stream.url));
    }

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.logging.level.trim().is_empty() {
        return Err(anyhow!("Log level must not be empty"));
    }

    let non_zero = [
        ("orders.submission_timeout_ms", config.orders.submission_timeout_ms),
        ("backend.request_timeout_secs", config.backend.request_timeout_secs),
        ("stream.initial_backoff_ms", config.stream.initial_backoff_ms),
        ("stream.heartbeat_interval_secs", config.stream.heartbeat_interval_secs),
        ("stream.pong_timeout_secs", config.stream.pong_timeout_secs),
        ("stream.channel_capacity", config.stream.channel_capacity as u64),
        ("store.command_buffer", config.store.command_buffer as u64),
        ("reconciler.seen_window_capacity", config.reconciler.seen_window_capacity as u64),
    ];
    for (name, value) in non_zero {
        if value == 0 {
            return Err(anyhow!("{} must be greater than zero", name));
        }
    }

    if config.metrics.enabled {
        config.metrics.listen_addr()?;
    }

    Ok(())
}
