//! Tracing and metrics bootstrap for the host.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::{MarketplaceError, Result};

/// Installs the global subscriber. An invalid filter falls back to `info`.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
    .map_err(|e| MarketplaceError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder with an HTTP scrape listener.
///
/// Must run inside the tokio runtime.
pub fn install_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MarketplaceError::Telemetry(e.to_string()))?;
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
