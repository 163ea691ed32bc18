//! # Upstream Module
//!
//! Fetching from the upstream maps API. [`UpstreamFetcher`] is the seam the
//! controller depends on; [`http::HttpUpstream`] is the reqwest-backed
//! implementation used in production.

pub mod http;

pub use self::http::HttpUpstream;

use crate::core::error::ProxyError;
use crate::core::types::CREDENTIAL_PARAM;
use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use thiserror::Error;

/// Fully read upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Upstream failure kinds. A non-2xx status is not one of them.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// DNS failure, refused connection, or timeout before response headers
    #[error("Upstream request failed: {0}")]
    Transport(String),

    /// Headers arrived but the body could not be read to completion
    #[error("Failed to read upstream body: {0}")]
    BodyRead(String),
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Transport(message) => ProxyError::UpstreamUnreachable { message },
            UpstreamError::BodyRead(message) => ProxyError::UpstreamBodyRead { message },
        }
    }
}

/// Fetches a path-and-query from the upstream API
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// `request_uri` is the inbound path plus query. `credential` is a
    /// header-supplied credential, injected only when the query has none.
    async fn fetch(
        &self,
        request_uri: &str,
        credential: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Build the outbound URL for a request.
///
/// A query credential is passed through untouched. Otherwise a header
/// credential is appended as `key=<credential>`.
pub fn build_outbound_uri(base_url: &str, request_uri: &str, credential: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    let mut uri = format!("{}{}", base, request_uri);

    let credential = match credential.filter(|c| !c.is_empty()) {
        Some(credential) => credential,
        None => return uri,
    };

    let query = request_uri.split_once('?').map(|(_, q)| q);
    let has_query_credential = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes()).any(|(name, _)| name == CREDENTIAL_PARAM)
        })
        .unwrap_or(false);

    if has_query_credential {
        return uri;
    }

    match query {
        None => uri.push('?'),
        Some("") => {}
        Some(_) => uri.push('&'),
    }

    uri.push_str(
        &url::form_urlencoded::Serializer::new(String::new())
            .append_pair(CREDENTIAL_PARAM, credential)
            .finish(),
    );
    uri
}

/// Replace credential values in a URL for logging
pub fn redact_credential(uri: &str) -> String {
    let (head, query) = match uri.split_once('?') {
        Some(parts) => parts,
        None => return uri.to_string(),
    };

    let redacted = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            url::form_urlencoded::parse(query.as_bytes()).map(|(name, value)| {
                if name == CREDENTIAL_PARAM {
                    (name, "REDACTED".into())
                } else {
                    (name, value)
                }
            }),
        )
        .finish();

    format!("{}?{}", head, redacted)
}
