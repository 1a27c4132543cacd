//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose the scanner, cache and notification counters.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use rattle_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL_SECS: u64 = 15;

/// Parse the configured listen address.
///
/// # Errors
///
/// Returns an error if `listen_addr:port` is not a valid socket address.
pub fn listen_address(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// This function should be called once per process. Before it runs, every
/// `metrics::counter!()` and `metrics::gauge!()` call is a no-op.
///
/// # Errors
///
/// - Invalid listen address
/// - Socket binding fails
/// - Global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_address(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    rattle_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

/// Periodically publish the daemon uptime until cancelled.
pub async fn run_uptime_updater(start: Instant, token: CancellationToken) {
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_secs(UPTIME_UPDATE_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                #[allow(clippy::cast_precision_loss)]
                metrics::gauge!(rattle_core::metrics::DAEMON_UPTIME_SECONDS)
                    .set(start.elapsed().as_secs() as f64);
            }
        }
    }
}
