//! Process-wide tracing subscriber and Prometheus recorder for embedders of
//! the registry.

use std::{net::SocketAddr, sync::Arc};

use metrics::describe_counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::{get_optional_var, hydrate_env_file};
use crate::services::registry::{REJECTIONS_METRIC, SERVERS_METRIC};

const DEFAULT_LOG_FILTER: &str = "info";

static SUBSCRIBER: OnceCell<()> = OnceCell::new();
static RECORDER: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    pub fn new(log_filter: impl Into<String>) -> Self {
        Self {
            log_filter: log_filter.into(),
            metrics_address: None,
        }
    }

    /// Serves `/metrics` on `address` once the recorder is installed.
    pub fn with_metrics_address(mut self, address: impl Into<String>) -> Self {
        self.metrics_address = Some(address.into());
        self
    }

    /// Reads `<PREFIX>_LOG_FILTER` and `<PREFIX>_METRICS_ADDRESS`. Blank values
    /// count as unset.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let prefix = prefix.trim().to_ascii_uppercase();
        let log_filter = get_optional_var(&format!("{prefix}_LOG_FILTER"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self {
            log_filter,
            metrics_address: get_optional_var(&format!("{prefix}_METRICS_ADDRESS")),
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_FILTER)
    }
}

/// Handle to the installed recorder. Every guard renders the same registry.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    /// Prometheus text exposition of every registry counter seen so far.
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Installs the subscriber and recorder on first call; later calls reuse them
/// and ignore `config`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_subscriber(config)?;
    let metrics = install_recorder(config)?;
    Ok(TelemetryGuard { metrics })
}

fn install_subscriber(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER.get().is_some() {
        return Ok(());
    }
    let filter = EnvFilter::try_new(config.log_filter())?;
    if SUBSCRIBER.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

fn install_recorder(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    RECORDER
        .get_or_try_init(|| -> Result<_, TelemetryError> {
            let mut builder = PrometheusBuilder::new();
            if let Some(address) = config.metrics_address() {
                builder = builder.with_http_listener(parse_address(address)?);
            }
            let handle = builder.install_recorder()?;
            describe_registry_metrics();
            Ok(Arc::new(handle))
        })
        .cloned()
}

fn parse_address(address: &str) -> Result<SocketAddr, TelemetryError> {
    address.parse().map_err(|source| TelemetryError::MetricsAddress {
        address: address.to_string(),
        source,
    })
}

fn describe_registry_metrics() {
    describe_counter!(
        REJECTIONS_METRIC,
        "Registry operations refused with a catalog error, by reason."
    );
    describe_counter!(SERVERS_METRIC, "Server records created or removed, by event.");
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] ParseError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
    #[error("invalid metrics address `{address}`: {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to install metrics recorder: {0}")]
    Recorder(#[from] BuildError),
}
