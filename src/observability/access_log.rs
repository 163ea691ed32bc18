//! # Access Log
//!
//! Per-request observation: one structured log line and the HTTP metrics for
//! every request. The liveness path is measured but not logged.
//!
//! The middleware runs outside the proxy handler, so it sees the final
//! status and the [`ProxyOutcome`] extension the controller attached.

use super::metrics::ProxyMetrics;
use crate::core::types::{IncomingRequest, ProxyOutcome};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

/// Shared state for [`observe_requests`]
#[derive(Debug, Clone)]
pub struct AccessLogState {
    pub metrics: ProxyMetrics,
    /// Requests to this path are not logged
    pub health_path: String,
    pub referrer_strip_suffix: Option<String>,
}

/// One access log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessLogEntry {
    pub ip: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    /// Empty when the request never reached the cache
    pub cache_status: String,
    pub referrer: Option<String>,
    pub duration_ms: u64,
}

impl AccessLogEntry {
    pub fn new(
        request: &IncomingRequest,
        status_code: u16,
        outcome: Option<ProxyOutcome>,
        referrer_strip_suffix: Option<&str>,
        duration: Duration,
    ) -> Self {
        Self {
            ip: client_ip(request),
            method: request.method.to_string(),
            path: request.path().to_string(),
            status_code,
            cache_status: outcome.map(|o| o.as_str().to_string()).unwrap_or_default(),
            referrer: request
                .header("referer")
                .filter(|r| !r.is_empty())
                .map(|r| normalize_referrer(r, referrer_strip_suffix)),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn emit(&self) {
        info!(
            ip = %self.ip,
            method = %self.method,
            path = %self.path,
            status_code = self.status_code,
            cache_status = %self.cache_status,
            referrer = self.referrer.as_deref().unwrap_or(""),
            duration_ms = self.duration_ms,
            "{} {}",
            self.method,
            self.path
        );
    }
}

/// Client address: first `X-Forwarded-For` hop, else the connection address
pub fn client_ip(request: &IncomingRequest) -> String {
    if let Some(forwarded) = request.header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return first.to_string();
        }
    }

    request
        .remote_addr
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reduce a referrer URL to its host, removing `suffix` when the host ends
/// with it. Values that do not parse as URLs are kept verbatim.
pub fn normalize_referrer(referrer: &str, suffix: Option<&str>) -> String {
    let host = match Url::parse(referrer) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_string(),
            None => return referrer.to_string(),
        },
        Err(_) => return referrer.to_string(),
    };

    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => match host.strip_suffix(suffix) {
            Some(stripped) if !stripped.is_empty() => stripped.to_string(),
            _ => host,
        },
        None => host,
    }
}

/// Middleware recording metrics and the access log for every request
pub async fn observe_requests(
    State(state): State<AccessLogState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let incoming = IncomingRequest::from_http(&request);

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let outcome = response.extensions().get::<ProxyOutcome>().copied();

    state
        .metrics
        .record_request(incoming.method.as_str(), incoming.path(), status, elapsed);
    if let Some(outcome) = outcome {
        state.metrics.record_outcome(outcome);
    }

    if incoming.path() != state.health_path {
        AccessLogEntry::new(
            &incoming,
            status,
            outcome,
            state.referrer_strip_suffix.as_deref(),
            elapsed,
        )
        .emit();
    }

    response
}
