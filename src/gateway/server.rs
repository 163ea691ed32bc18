//! # HTTP Server
//!
//! Axum server hosting the proxy.
//!
//! Routes:
//! - `GET /health`: liveness, never cached
//! - `GET /metrics`: Prometheus exposition, when a recorder handle is given
//! - everything else: the proxy controller
//!
//! Layers, outermost first: `TraceLayer`, the access-log/metrics middleware,
//! then `CorsLayer`, so answered preflights are still logged and counted.

use super::controller::ProxyController;
use crate::core::config::ServerConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{IncomingRequest, CREDENTIAL_HEADER};
use crate::observability::access_log::{observe_requests, AccessLogState};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ProxyController>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Build the application router
pub fn build_router(
    config: &ServerConfig,
    state: AppState,
    access_log: AccessLogState,
) -> Router {
    let mut app = Router::new().route(&config.health_path, get(health_check));

    if state.metrics_handle.is_some() {
        app = app.route(&config.metrics_path, get(metrics_handler));
    }

    app.fallback(proxy_handler).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn_with_state(access_log, observe_requests))
            .layer(cors_layer()),
    )
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CREDENTIAL_HEADER),
        ])
}

/// Liveness handler
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("ok\nversion: {}\n", env!("CARGO_PKG_VERSION")),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    state.controller.handle(IncomingRequest::from_http(&request)).await
}

/// The proxy's HTTP server
pub struct ProxyServer {
    app: Router,
    bind_address: String,
}

impl ProxyServer {
    pub fn new(config: &ServerConfig, state: AppState, access_log: AccessLogState) -> Self {
        Self {
            app: build_router(config, state, access_log),
            bind_address: format!("{}:{}", config.bind_address, config.port),
        }
    }

    /// Serve until SIGINT or SIGTERM, then drain in-flight requests
    pub async fn start(self) -> ProxyResult<()> {
        let listener = TcpListener::bind(&self.bind_address).await.map_err(|e| {
            ProxyError::internal(format!("Failed to bind server to {}: {}", self.bind_address, e))
        })?;

        info!("Proxy HTTP server listening on {}", self.bind_address);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ProxyError::internal(format!("Server error: {}", e)))?;

        info!("Proxy HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
