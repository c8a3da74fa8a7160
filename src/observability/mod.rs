//! Observability module for infergate.
//!
//! Provides logging and Prometheus metrics for the listeners and the data plane.

use crate::config::ObservabilityConfig;
use crate::error::{GatewayError, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static PROMETHEUS: Mutex<Option<PrometheusHandle>> = parking_lot::const_mutex(None);

/// How often the recorder drains histogram buckets while a metrics listener runs.
pub const UPKEEP_PERIOD: Duration = Duration::from_secs(5);

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| GatewayError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| GatewayError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Install the Prometheus recorder, or return the one already installed.
///
/// The recorder is process-global, so every gateway in the process shares it.
pub fn install_metrics() -> Result<PrometheusHandle> {
    let mut slot = PROMETHEUS.lock();
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        GatewayError::Internal(format!("Failed to install metrics recorder: {}", e))
    })?;

    register_metrics();
    *slot = Some(handle.clone());
    Ok(handle)
}

/// Runs recorder upkeep every `period` until the future is dropped.
///
/// `install_recorder` leaves upkeep to the caller; without it histogram samples
/// accumulate between scrapes.
pub async fn run_upkeep(handle: PrometheusHandle, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        handle.run_upkeep();
    }
}

/// Register standard metrics.
fn register_metrics() {
    gauge!("infergate_models_registered").set(0.0);
    counter!("infergate_requests_total").absolute(0);
    counter!("infergate_model_lifecycle_total").absolute(0);
}

/// Record one request handled by a protocol adapter.
pub fn record_request(
    protocol: &'static str,
    operation: &'static str,
    status: &str,
    elapsed: Duration,
) {
    counter!(
        "infergate_requests_total",
        "protocol" => protocol,
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "infergate_request_duration_seconds",
        "protocol" => protocol,
        "operation" => operation
    )
    .record(elapsed.as_secs_f64());
}

/// Record a model lifecycle event (`registered`, `loaded`, `load_failed`, `unloaded`).
pub fn record_model_event(event: &'static str) {
    counter!("infergate_model_lifecycle_total", "event" => event).increment(1);
}

/// Update the registered model count.
pub fn update_registry_metrics(models: usize) {
    gauge!("infergate_models_registered").set(models as f64);
}
