//! # Error Handling Module
//!
//! Crate-level error type for the proxy, built with `thiserror`. The
//! `UpstreamError` and `AnalyticsError` component errors convert into
//! [`ProxyError`] through `From`, and [`ProxyError`] knows how to turn itself
//! into an HTTP response. Cache store failures never leave the cache manager.
//!
//! Upstream failures are answered with a fixed, user-facing plain-text
//! message. The underlying cause only ever reaches the logs.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Body returned to clients when the upstream API could not be reached.
pub const UPSTREAM_FETCH_FAILED_MESSAGE: &str = "Failed to fetch from upstream API";

/// Body returned to clients when the upstream body could not be fully read.
pub const BODY_READ_FAILED_MESSAGE: &str = "Failed to read response body";

/// Main result type used throughout the proxy
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Error types for the caching proxy
#[derive(Debug, Error, Clone)]
pub enum ProxyError {
    /// Configuration-related errors (invalid env values, unreadable files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transport-level failure contacting the upstream API
    #[error("Upstream unreachable: {message}")]
    UpstreamUnreachable { message: String },

    /// The upstream connection succeeded but its body could not be read
    #[error("Upstream body read failed: {message}")]
    UpstreamBodyRead { message: String },

    /// Analytics sink failures
    #[error("Analytics error: {message}")]
    Analytics { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code returned to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamUnreachable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamBodyRead { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } | Self::Analytics { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error category, used in logs and JSON bodies
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::UpstreamUnreachable { .. } => "upstream_unreachable",
            Self::UpstreamBodyRead { .. } => "upstream_body_read_error",
            Self::Analytics { .. } => "analytics_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Fixed message shown to clients, if this error has one.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            Self::UpstreamUnreachable { .. } => Some(UPSTREAM_FETCH_FAILED_MESSAGE),
            Self::UpstreamBodyRead { .. } => Some(BODY_READ_FAILED_MESSAGE),
            _ => None,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Some(message) = self.client_message() {
            return (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                message,
            )
                .into_response();
        }

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
