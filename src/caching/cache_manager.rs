//! # Cache Manager
//!
//! Wraps a [`CacheStore`] with the policy the request path needs:
//!
//! - every operation is bounded by a timeout;
//! - a failed lookup is logged and treated as a miss;
//! - a failed write is logged and handed back to the caller;
//! - store latency and availability are recorded on every call.
//!
//! Nothing is retried; a slow or down store costs at most one timeout per
//! operation.

use super::{CacheError, CacheKey, CacheResult, CacheStore};
use crate::observability::metrics::ProxyMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Coordinates cache reads and writes for the proxy
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    operation_timeout: Duration,
    metrics: ProxyMetrics,
}

impl CacheManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        ttl: Duration,
        operation_timeout: Duration,
        metrics: ProxyMetrics,
    ) -> Self {
        Self {
            store,
            ttl,
            operation_timeout,
            metrics,
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Look up a cached body. Store failures degrade to `None`.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match self.timed("get", self.store.get(key.as_str())).await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    cache_key = %key,
                    store = self.store.name(),
                    error = %e,
                    "Cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// Store a body under the configured TTL
    pub async fn set(&self, key: &CacheKey, value: &[u8]) -> CacheResult<()> {
        self.timed("set", self.store.set(key.as_str(), value, self.ttl))
            .await
    }

    /// Startup connectivity check
    pub async fn ping(&self) -> CacheResult<()> {
        self.timed("ping", self.store.ping()).await
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.operation_timeout)),
        };

        self.metrics
            .record_store_operation(operation, start.elapsed(), result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::InMemoryCache;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Unavailable)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable)
        }

        async fn ping(&self) -> CacheResult<()> {
            Err(CacheError::Unavailable)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CacheStore for SlowStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(b"late".to_vec()))
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn ping(&self) -> CacheResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn manager(store: Arc<dyn CacheStore>) -> CacheManager {
        CacheManager::new(
            store,
            Duration::from_secs(60),
            Duration::from_millis(50),
            ProxyMetrics::new(),
        )
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s.to_string(), "")
    }

    #[tokio::test]
    async fn test_round_trip_through_memory_store() {
        let manager = manager(Arc::new(InMemoryCache::new()));

        assert_eq!(manager.get(&key("a")).await, None);
        manager.set(&key("a"), b"body").await.unwrap();
        assert_eq!(manager.get(&key("a")).await, Some(b"body".to_vec()));
        assert!(manager.metrics.store_available());
    }

    #[tokio::test]
    async fn test_failing_store_degrades() {
        let manager = manager(Arc::new(FailingStore));

        assert_eq!(manager.get(&key("a")).await, None);
        assert!(matches!(
            manager.set(&key("a"), b"body").await,
            Err(CacheError::Unavailable)
        ));
        assert!(manager.ping().await.is_err());
        assert!(!manager.metrics.store_available());
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let manager = manager(Arc::new(SlowStore));

        assert_eq!(manager.get(&key("a")).await, None);
        assert!(matches!(
            manager.set(&key("a"), b"body").await,
            Err(CacheError::Timeout(_))
        ));
    }
}
