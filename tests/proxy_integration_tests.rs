//! # Proxy Integration Tests
//!
//! End-to-end tests of the router against a mocked upstream API. The cache
//! is the in-memory store; Redis-backed runs live in the store's own tests.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::Router;
use axum_test::TestServer;
use maps_cache_proxy::caching::{CacheManager, InMemoryCache, KeyGenerator};
use maps_cache_proxy::core::config::{ServerConfig, UpstreamConfig};
use maps_cache_proxy::core::error::UPSTREAM_FETCH_FAILED_MESSAGE;
use maps_cache_proxy::gateway::{build_router, AppState, CachePolicy, ProxyController};
use maps_cache_proxy::observability::access_log::AccessLogState;
use maps_cache_proxy::observability::metrics::ProxyMetrics;
use maps_cache_proxy::upstream::HttpUpstream;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLACES_BODY: &str = r#"{"results":[{"name":"Joe's Pizza"}],"status":"OK"}"#;

struct Harness {
    server: TestServer,
    store: InMemoryCache,
}

fn build_app(base_url: &str, store: InMemoryCache, prefix: &str) -> Router {
    let metrics = ProxyMetrics::new();
    let cache = CacheManager::new(
        Arc::new(store),
        Duration::from_secs(3600),
        Duration::from_millis(500),
        metrics.clone(),
    );
    let upstream = HttpUpstream::new(&UpstreamConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        verbose_logging: false,
    })
    .unwrap();
    let controller = ProxyController::new(
        KeyGenerator::new().with_prefix(prefix),
        cache,
        Arc::new(upstream),
        CachePolicy::default(),
        None,
    );
    let config = ServerConfig::default();

    build_router(
        &config,
        AppState {
            controller: Arc::new(controller),
            metrics_handle: None,
        },
        AccessLogState {
            metrics,
            health_path: config.health_path.clone(),
            referrer_strip_suffix: Some(".bb.gravitate.energy".to_string()),
        },
    )
}

fn harness(base_url: &str) -> Harness {
    let store = InMemoryCache::new();
    let server = TestServer::new(build_app(base_url, store.clone(), "test")).unwrap();
    Harness { server, store }
}

fn places_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/json; charset=UTF-8")
        .insert_header("expires", "Mon, 19 Oct 2026 11:00:00 GMT")
        .set_body_string(PLACES_BODY)
}

#[tokio::test]
async fn test_credential_does_not_fragment_cache() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("location", "NewYork"))
        .respond_with(places_response())
        .expect(1)
        .mount(&upstream)
        .await;

    let h = harness(&upstream.uri());

    let first = h.server.get("/query?location=NewYork&key=abc123").await;
    first.assert_status_ok();
    assert_eq!(first.header("x-cache"), "MISS");
    assert_eq!(first.header("content-type"), "application/json; charset=UTF-8");
    assert_eq!(first.header("expires"), "Mon, 19 Oct 2026 11:00:00 GMT");
    first.assert_text(PLACES_BODY);

    let second = h.server.get("/query?location=NewYork&key=def456").await;
    second.assert_status_ok();
    assert_eq!(second.header("x-cache"), "HIT");
    assert_eq!(second.header("content-type"), "application/json");
    second.assert_text(PLACES_BODY);

    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_header_credential_is_injected_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .and(query_param("address", "Paris"))
        .and(query_param("key", "header-key"))
        .respond_with(places_response())
        .expect(1)
        .mount(&upstream)
        .await;

    let h = harness(&upstream.uri());

    let response = h
        .server
        .get("/maps/api/geocode/json?address=Paris")
        .add_header(
            HeaderName::from_static("x-maps-api-key"),
            HeaderValue::from_static("header-key"),
        )
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("x-cache"), "MISS");

    // Same question without any credential hits the entry
    let response = h.server.get("/maps/api/geocode/json?address=Paris").await;
    assert_eq!(response.header("x-cache"), "HIT");
}

#[tokio::test]
async fn test_directions_ignore_non_whitelisted_parameters() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/api/directions/json"))
        .respond_with(places_response())
        .expect(2)
        .mount(&upstream)
        .await;

    let h = harness(&upstream.uri());

    let first = h
        .server
        .get("/maps/api/directions/json?origin=30.1,40.2&destination=31.1,41.2&foo=bar")
        .await;
    assert_eq!(first.header("x-cache"), "MISS");

    let reordered = h
        .server
        .get("/maps/api/directions/json?destination=31.1,41.2&origin=30.1,40.2&baz=qux")
        .await;
    assert_eq!(reordered.header("x-cache"), "HIT");

    let other_origin = h
        .server
        .get("/maps/api/directions/json?origin=32.1,42.2&destination=31.1,41.2")
        .await;
    assert_eq!(other_origin.header("x-cache"), "MISS");
}

#[tokio::test]
async fn test_non_cacheable_status_passes_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend overloaded"))
        .expect(2)
        .mount(&upstream)
        .await;

    let h = harness(&upstream.uri());

    for _ in 0..2 {
        let response = h.server.get("/query?location=NewYork").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.header("x-cache"), "MISS");
        response.assert_text("backend overloaded");
    }
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let h = harness("http://127.0.0.1:1");

    let response = h.server.get("/query?location=NewYork").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_text(UPSTREAM_FETCH_FAILED_MESSAGE);
    assert!(response.headers().get("x-cache").is_none());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_concurrent_misses_converge() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(places_response().set_delay(Duration::from_millis(50)))
        .mount(&upstream)
        .await;

    let h = harness(&upstream.uri());

    let (a, b, c) = tokio::join!(
        h.server.get("/query?location=Boston&key=one").into_future(),
        h.server.get("/query?key=two&location=Boston").into_future(),
        h.server.get("/query?location=Boston").into_future(),
    );
    for response in [a, b, c] {
        response.assert_status_ok();
        response.assert_text(PLACES_BODY);
    }

    let calls = upstream.received_requests().await.unwrap().len();
    assert!((1..=3).contains(&calls));
    assert_eq!(h.store.len(), 1);

    let after = h.server.get("/query?location=Boston").await;
    assert_eq!(after.header("x-cache"), "HIT");
}

#[tokio::test]
async fn test_prefixes_isolate_environments() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(places_response())
        .expect(2)
        .mount(&upstream)
        .await;

    let store = InMemoryCache::new();
    let staging = TestServer::new(build_app(&upstream.uri(), store.clone(), "staging")).unwrap();
    let prod = TestServer::new(build_app(&upstream.uri(), store.clone(), "prod")).unwrap();

    assert_eq!(staging.get("/query?location=NewYork").await.header("x-cache"), "MISS");
    assert_eq!(prod.get("/query?location=NewYork").await.header("x-cache"), "MISS");
    assert_eq!(prod.get("/query?location=NewYork").await.header("x-cache"), "HIT");
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_health_is_never_proxied() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(places_response())
        .expect(0)
        .mount(&upstream)
        .await;

    let h = harness(&upstream.uri());

    let response = h.server.get("/health").await;
    response.assert_status_ok();
    assert!(response.text().starts_with("ok\nversion: "));
    assert!(h.store.is_empty());
}
