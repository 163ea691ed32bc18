//! # Proxy Controller
//!
//! Hit/miss control flow for one request:
//!
//! ```text
//! derive key -> cache get -+-> hit  -> 200, cached body, X-Cache: HIT
//!                          |
//!                          +-> miss -> upstream fetch -+-> ok    -> cache set (best effort) -> X-Cache: MISS
//!                                                      +-> error -> 500, fixed message, no write
//! ```
//!
//! Cache writes and analytics are best effort and never change what the
//! client receives. Each request runs the flow exactly once; nothing is
//! retried.

use crate::caching::{CacheKey, CacheManager, KeyGenerator};
use crate::core::error::ProxyError;
use crate::core::types::{IncomingRequest, ProxyOutcome, CACHE_STATUS_HEADER, CREDENTIAL_HEADER};
use crate::observability::analytics::{AnalyticsRecorder, CacheEventKind};
use crate::upstream::{UpstreamFetcher, UpstreamResponse};
use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Upstream headers copied onto a miss response
pub const PASSTHROUGH_HEADERS: &[&str] = &["content-type", "date", "expires", "alt-svc"];

/// Which upstream responses are written to the cache.
///
/// A hit replays the stored body as `200 application/json`; the upstream
/// status is not stored, which is why configuration only admits 2xx codes.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub cacheable_status_codes: Vec<u16>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cacheable_status_codes: vec![200],
        }
    }
}

impl CachePolicy {
    pub fn new(cacheable_status_codes: Vec<u16>) -> Self {
        Self {
            cacheable_status_codes,
        }
    }

    pub fn is_cacheable(&self, status: StatusCode) -> bool {
        self.cacheable_status_codes.contains(&status.as_u16())
    }
}

/// Serves requests from the cache or the upstream API
#[derive(Clone)]
pub struct ProxyController {
    keys: KeyGenerator,
    cache: CacheManager,
    upstream: Arc<dyn UpstreamFetcher>,
    policy: CachePolicy,
    analytics: Option<AnalyticsRecorder>,
}

impl ProxyController {
    pub fn new(
        keys: KeyGenerator,
        cache: CacheManager,
        upstream: Arc<dyn UpstreamFetcher>,
        policy: CachePolicy,
        analytics: Option<AnalyticsRecorder>,
    ) -> Self {
        Self {
            keys,
            cache,
            upstream,
            policy,
            analytics,
        }
    }

    /// Handle one request. The response carries its [`ProxyOutcome`] as an
    /// extension.
    pub async fn handle(&self, request: IncomingRequest) -> Response {
        let key = self.keys.derive(&request);

        if let Some(body) = self.cache.get(&key).await {
            debug!(cache_key = %key, "Cache hit");
            self.record_event(CacheEventKind::Hit, &request, &key);
            return hit_response(body);
        }

        debug!(cache_key = %key, "Cache miss");
        let credential = request.header(CREDENTIAL_HEADER).filter(|c| !c.is_empty());

        let upstream = match self.upstream.fetch(request.request_uri(), credential).await {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(path = %request.path(), error = %e, "Upstream fetch failed");
                let mut response = ProxyError::from(e).into_response();
                response.extensions_mut().insert(ProxyOutcome::UpstreamError);
                return response;
            }
        };

        let mut outcome = ProxyOutcome::Miss;
        if self.policy.is_cacheable(upstream.status) {
            if let Err(e) = self.cache.set(&key, &upstream.body).await {
                warn!(cache_key = %key, error = %e, "Failed to cache response");
                outcome = ProxyOutcome::CacheWriteError;
            }
        } else {
            debug!(
                cache_key = %key,
                status = upstream.status.as_u16(),
                "Upstream status not cacheable"
            );
        }

        self.record_event(CacheEventKind::Miss, &request, &key);
        miss_response(upstream, outcome)
    }

    fn record_event(&self, kind: CacheEventKind, request: &IncomingRequest, key: &CacheKey) {
        if let Some(analytics) = &self.analytics {
            analytics.emit(kind, request, key);
        }
    }
}

fn hit_response(body: Vec<u8>) -> Response {
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (HeaderName::from_static(CACHE_STATUS_HEADER), "HIT"),
        ],
        body,
    )
        .into_response();
    response.extensions_mut().insert(ProxyOutcome::Hit);
    response
}

fn miss_response(upstream: UpstreamResponse, outcome: ProxyOutcome) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;

    let headers = response.headers_mut();
    for name in PASSTHROUGH_HEADERS {
        if let Some(value) = upstream.headers.get(*name) {
            headers.insert(HeaderName::from_static(name), value.clone());
        }
    }
    if let Some(value) = outcome.header_value() {
        headers.insert(
            HeaderName::from_static(CACHE_STATUS_HEADER),
            HeaderValue::from_static(value),
        );
    }

    response.extensions_mut().insert(outcome);
    response
}
