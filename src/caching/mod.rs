//! # Caching Module
//!
//! Cache-key derivation and the shared response store.
//!
//! ## Architecture
//! 1. **Key Generator**: canonicalizes a request and hashes it into a [`CacheKey`]
//! 2. **Cache Stores**: Redis and in-memory implementations of [`CacheStore`]
//! 3. **Cache Manager**: wraps a store with timeouts, degradation and metrics
//!
//! Entries are never deleted by the proxy; the store owns expiry through the
//! TTL set on write.

pub mod cache_manager;
pub mod key_generator;
pub mod stores;

pub use cache_manager::CacheManager;
pub use key_generator::{CacheKey, CanonicalKeyInput, EndpointClass, KeyGenerator};
pub use stores::{CacheStore, InMemoryCache, RedisCache};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Cache not available")]
    Unavailable,
}
