//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{
    increment, record_anomaly, record_latency, record_rejection, set_gauge, set_gauge_decimal,
    CounterMetric, GaugeMetric, LatencyMetric,
};

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Guard held for the life of the process
pub struct TelemetryGuard {
    /// Address of the Prometheus scrape endpoint, when enabled
    pub metrics_addr: Option<SocketAddr>,
}

/// Initialize all telemetry subsystems
///
/// Must be called from within a tokio runtime when a metrics port is set.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, config.log_format)?;

    let metrics_addr = match config.metrics_port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
            tracing::info!(metrics_addr = %addr, "Prometheus exporter listening");
            Some(addr)
        }
        None => None,
    };

    Ok(TelemetryGuard { metrics_addr })
}
