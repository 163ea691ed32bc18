//! # Maps Cache Proxy - Main Entry Point
//!
//! Startup sequence:
//! 1. Load configuration (`PROXY_CONFIG_PATH` YAML file if set, then env)
//! 2. Initialize logging and the Prometheus recorder
//! 3. Connect the cache store and PING it; failure here is fatal
//! 4. Build the upstream client, analytics and controller
//! 5. Serve until SIGINT/SIGTERM

use anyhow::Context;
use maps_cache_proxy::caching::{CacheManager, CacheStore, InMemoryCache, KeyGenerator, RedisCache};
use maps_cache_proxy::core::config::{CacheBackend, CacheConfig, ProxyConfig};
use maps_cache_proxy::gateway::{AppState, CachePolicy, ProxyController, ProxyServer};
use maps_cache_proxy::observability::access_log::AccessLogState;
use maps_cache_proxy::observability::analytics::AnalyticsRecorder;
use maps_cache_proxy::observability::metrics::{install_prometheus_recorder, ProxyMetrics};
use maps_cache_proxy::observability::init_logging;
use maps_cache_proxy::upstream::HttpUpstream;
use std::sync::Arc;
use tracing::info;

const CONFIG_PATH_VAR: &str = "PROXY_CONFIG_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await.context("Failed to load configuration")?;

    init_logging(&config.observability);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting maps cache proxy");

    let metrics_handle = install_prometheus_recorder()?;
    let metrics = ProxyMetrics::new();

    let store = connect_store(&config.cache).await?;
    let cache = CacheManager::new(
        store,
        config.cache.ttl,
        config.cache.operation_timeout,
        metrics.clone(),
    );
    cache
        .ping()
        .await
        .with_context(|| format!("Cache store ({}) did not answer PING", cache.store_name()))?;
    info!(store = cache.store_name(), ttl = ?config.cache.ttl, "Cache store ready");

    let upstream = HttpUpstream::new(&config.upstream)?;
    info!(base_url = %upstream.base_url(), "Upstream configured");

    let analytics = AnalyticsRecorder::from_config(&config.observability)?;
    if analytics.is_some() {
        info!(
            sample_rate = config.observability.influx_sample_rate,
            "Cache analytics enabled"
        );
    }

    let controller = ProxyController::new(
        KeyGenerator::new().with_prefix(config.cache.key_prefix.clone()),
        cache,
        Arc::new(upstream),
        CachePolicy::new(config.cache.cacheable_status_codes.clone()),
        analytics,
    );

    let server = ProxyServer::new(
        &config.server,
        AppState {
            controller: Arc::new(controller),
            metrics_handle: Some(metrics_handle),
        },
        AccessLogState {
            metrics,
            health_path: config.server.health_path.clone(),
            referrer_strip_suffix: config.observability.referrer_strip_suffix.clone(),
        },
    );

    server.start().await?;

    info!("Maps cache proxy shutdown complete");
    Ok(())
}

async fn load_config() -> anyhow::Result<ProxyConfig> {
    let config = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.is_empty() => ProxyConfig::load_from_file(&path)
            .await
            .with_context(|| format!("Failed to load {}", path))?,
        _ => ProxyConfig::from_env()?,
    };
    Ok(config)
}

async fn connect_store(config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Redis => {
            let url = config.redis_url();
            let redis = RedisCache::connect(&url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", url))?;
            Arc::new(redis)
        }
        CacheBackend::Memory => Arc::new(InMemoryCache::new()),
    };
    Ok(store)
}
