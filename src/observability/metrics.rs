//! Prometheus metrics for the identity provider.
//!
//! Provides metrics for:
//! - SSO request outcomes and latency
//! - Assertion signing latency
//! - Authentication attempts
//! - Tenant cache effectiveness

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;
use std::time::Duration;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    // Build Prometheus exporter with custom buckets
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &seconds_from_ms(&config.latency_buckets_ms),
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    // Store handle for the metrics endpoint
    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Convert millisecond buckets to seconds.
#[cfg(feature = "prometheus")]
fn seconds_from_ms(ms_buckets: &[f64]) -> Vec<f64> {
    ms_buckets.iter().map(|ms| ms / 1000.0).collect()
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record the terminal outcome of one SSO request.
///
/// # Arguments
/// * `binding` - "redirect" or "post"
/// * `outcome` - "issued", "credentials_required", or an error outcome such as
///   "tenant_not_found"
pub fn record_sso_request(binding: &str, outcome: &str, duration: Duration) {
    #[cfg(feature = "prometheus")]
    {
        counter!("sso_requests_total", "binding" => binding.to_string(), "outcome" => outcome.to_string())
            .increment(1);
        histogram!("sso_request_duration_seconds", "binding" => binding.to_string())
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (binding, outcome, duration);
    }
}

/// Record one call to the assertion signer.
pub fn record_signing(duration: Duration, success: bool) {
    #[cfg(feature = "prometheus")]
    {
        let status = if success { "success" } else { "failure" };
        counter!("assertions_signed_total", "status" => status.to_string()).increment(1);
        histogram!("assertion_signing_duration_seconds", "status" => status.to_string())
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (duration, success);
    }
}

/// Record authentication result.
pub fn record_auth_attempt(method: &str, success: bool) {
    #[cfg(feature = "prometheus")]
    {
        let status = if success { "success" } else { "failure" };
        counter!("auth_attempts_total", "method" => method.to_string(), "status" => status.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (method, success);
    }
}

/// Record a tenant cache lookup ("hit" or "miss").
pub fn record_tenant_cache(result: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("tenant_cache_lookups_total", "result" => result.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = result;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
