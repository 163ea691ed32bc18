//! # Cache Stores Module
//!
//! Backends for cached response bodies. Values are opaque bytes; keys are
//! already namespaced by the key generator.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryCache;
pub use redis_store::RedisCache;

use super::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for cache store implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache; `None` when the key is absent or expired
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value. A zero TTL stores without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Round-trip to the backend
    async fn ping(&self) -> CacheResult<()>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
