//! # Observability Module
//!
//! Logging, Prometheus metrics, the per-request access log and sampled cache
//! analytics. Nothing here sits on the response error path: every sink
//! failure is logged and dropped.

pub mod access_log;
pub mod analytics;
pub mod logging;
pub mod metrics;

pub use access_log::{observe_requests, AccessLogEntry, AccessLogState};
pub use analytics::{AnalyticsRecorder, AnalyticsSink, CacheEventKind, InfluxSink, RateSampler, Sampler};
pub use logging::init_logging;
pub use self::metrics::ProxyMetrics;
