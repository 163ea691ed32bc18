//! # Metrics
//!
//! Thin wrapper over the `metrics` facade. The Prometheus recorder is
//! installed once by the binary; everything here records through whatever
//! recorder is active, so tests can scope a local one.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `http_requests_total` | counter | `method`, `path`, `status` |
//! | `http_request_duration_seconds` | histogram | `method`, `path` |
//! | `cache_requests_total` | counter | `outcome` |
//! | `redis_latency_seconds` | histogram | `operation` |
//! | `redis_up` | gauge | |

use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::ProxyOutcome;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const CACHE_REQUESTS_TOTAL: &str = "cache_requests_total";
pub const REDIS_LATENCY_SECONDS: &str = "redis_latency_seconds";
pub const REDIS_UP: &str = "redis_up";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global Prometheus recorder and return its render handle.
pub fn install_prometheus_recorder() -> ProxyResult<PrometheusHandle> {
    prometheus_builder()?
        .install_recorder()
        .map_err(|e| ProxyError::internal(format!("Failed to install metrics recorder: {}", e)))
}

/// Builder with histogram buckets for the latency metrics
pub fn prometheus_builder() -> ProxyResult<PrometheusBuilder> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full(REDIS_LATENCY_SECONDS.to_string()),
                LATENCY_BUCKETS,
            )
        })
        .map_err(|e| ProxyError::internal(format!("Invalid metrics buckets: {}", e)))?;

    Ok(builder)
}

/// Proxy metrics recorder
#[derive(Debug, Clone, Default)]
pub struct ProxyMetrics {
    store_up: Arc<AtomicBool>,
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed HTTP request
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        metrics::counter!(
            HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status" => status.to_string()
        )
        .increment(1);

        metrics::histogram!(
            HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string(),
            "path" => path.to_string()
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_outcome(&self, outcome: ProxyOutcome) {
        metrics::counter!(CACHE_REQUESTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    }

    /// Record a store round trip and flip availability accordingly
    pub fn record_store_operation(&self, operation: &'static str, elapsed: Duration, success: bool) {
        metrics::histogram!(REDIS_LATENCY_SECONDS, "operation" => operation)
            .record(elapsed.as_secs_f64());
        self.set_store_available(success);
    }

    pub fn set_store_available(&self, available: bool) {
        self.store_up.store(available, Ordering::Relaxed);
        metrics::gauge!(REDIS_UP).set(if available { 1.0 } else { 0.0 });
    }

    /// Availability as of the last store operation
    pub fn store_available(&self) -> bool {
        self.store_up.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metrics_are_rendered() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let metrics = ProxyMetrics::new();

        metrics::with_local_recorder(&recorder, || {
            metrics.record_request("GET", "/query", 200, Duration::from_millis(12));
            metrics.record_outcome(ProxyOutcome::Hit);
        });

        let rendered = handle.render();
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("status=\"200\""));
        assert!(rendered.contains("http_request_duration_seconds_bucket"));
        assert!(rendered.contains("outcome=\"HIT\""));
    }

    #[test]
    fn test_store_availability_follows_last_operation() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let metrics = ProxyMetrics::new();

        metrics::with_local_recorder(&recorder, || {
            metrics.record_store_operation("get", Duration::from_millis(1), true);
            assert!(metrics.store_available());
            metrics.record_store_operation("set", Duration::from_millis(1), false);
        });

        assert!(!metrics.store_available());
        let rendered = handle.render();
        assert!(rendered.contains("redis_up 0"));
        assert!(rendered.contains("redis_latency_seconds"));
    }
}
