//! # Core Types
//!
//! Request model shared by the key deriver, the controller and the
//! observability layer, plus the per-request cache outcome.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, Uri};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Header carrying the API credential when it is not sent as a query parameter.
pub const CREDENTIAL_HEADER: &str = "x-maps-api-key";

/// Query parameter carrying the API credential.
pub const CREDENTIAL_PARAM: &str = "key";

/// Header revealing whether a response was served from cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Inbound request as seen by the proxy.
///
/// Only the parts that matter for caching and logging are kept; the body is
/// never read because the upstream API is GET-only.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Connection address, when the server was started with connect info
    pub remote_addr: Option<SocketAddr>,
}

impl IncomingRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            method,
            uri,
            headers,
            remote_addr,
        }
    }

    /// Build from an axum request, picking up `ConnectInfo` if present.
    pub fn from_http<B>(request: &Request<B>) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
            remote_addr,
        )
    }

    /// Request path without query parameters
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path plus query, exactly as received (`/a/b?x=1`)
    pub fn request_uri(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    /// Case-insensitive header lookup; non-UTF-8 values are treated as absent
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decoded query parameters in arrival order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Query parameters decoded to exact bytes, in arrival order.
    ///
    /// Same splitting rules as `application/x-www-form-urlencoded` (`&`, `=`,
    /// `+` as space) but invalid UTF-8 is kept verbatim, so `%FF` and `%FE`
    /// stay distinct.
    pub fn query_pairs_raw(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let Some(query) = self.query() else {
            return Vec::new();
        };

        query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
                (decode_component(name), decode_component(value))
            })
            .collect()
    }

    /// Credential supplied with the request: header first, then query.
    pub fn credential(&self) -> Option<String> {
        if let Some(key) = self.header(CREDENTIAL_HEADER).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }

        self.query_pairs()
            .into_iter()
            .find(|(name, value)| name == CREDENTIAL_PARAM && !value.is_empty())
            .map(|(_, value)| value)
    }
}

/// Per-request verdict of the proxy controller.
///
/// Travels as a response extension so outer layers can log it; it is never
/// reported to the client as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyOutcome {
    Hit,
    Miss,
    UpstreamError,
    /// Served from upstream, but the cache write failed
    CacheWriteError,
}

impl ProxyOutcome {
    /// Value for the cache-status response header, if one is sent
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Self::Hit => Some("HIT"),
            Self::Miss | Self::CacheWriteError => Some("MISS"),
            Self::UpstreamError => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::CacheWriteError => "CACHE_WRITE_ERROR",
        }
    }
}

fn decode_component(component: &str) -> Vec<u8> {
    let spaced = component.replace('+', " ");
    percent_decode_str(&spaced).collect()
}

impl fmt::Display for ProxyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: HeaderMap) -> IncomingRequest {
        IncomingRequest::new(Method::GET, uri.parse().unwrap(), headers, None)
    }

    #[test]
    fn test_query_pairs_are_decoded() {
        let req = request("/query?location=New%20York&type=a+b&empty=", HeaderMap::new());
        assert_eq!(
            req.query_pairs(),
            vec![
                ("location".to_string(), "New York".to_string()),
                ("type".to_string(), "a b".to_string()),
                ("empty".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_raw_query_pairs_keep_invalid_utf8() {
        let req = request("/query?q=%FF&r=%EF%BF%BD&s=a+b&flag&&t=x%3Dy", HeaderMap::new());
        assert_eq!(
            req.query_pairs_raw(),
            vec![
                (b"q".to_vec(), vec![0xFF]),
                (b"r".to_vec(), "\u{FFFD}".as_bytes().to_vec()),
                (b"s".to_vec(), b"a b".to_vec()),
                (b"flag".to_vec(), Vec::new()),
                (b"t".to_vec(), b"x=y".to_vec()),
            ]
        );
    }

    #[test]
    fn test_request_uri_keeps_query() {
        let req = request("/maps/api/geocode/json?address=x", HeaderMap::new());
        assert_eq!(req.request_uri(), "/maps/api/geocode/json?address=x");
        assert_eq!(request("/health", HeaderMap::new()).request_uri(), "/health");
    }

    #[test]
    fn test_credential_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Maps-API-Key", "from-header".parse().unwrap());
        let req = request("/query?key=from-query", headers);
        assert_eq!(req.credential().as_deref(), Some("from-header"));

        let req = request("/query?key=from-query", HeaderMap::new());
        assert_eq!(req.credential().as_deref(), Some("from-query"));

        assert_eq!(request("/query?location=x", HeaderMap::new()).credential(), None);
    }

    #[test]
    fn test_outcome_header_values() {
        assert_eq!(ProxyOutcome::Hit.header_value(), Some("HIT"));
        assert_eq!(ProxyOutcome::Miss.header_value(), Some("MISS"));
        assert_eq!(ProxyOutcome::CacheWriteError.header_value(), Some("MISS"));
        assert_eq!(ProxyOutcome::UpstreamError.header_value(), None);
    }
}
