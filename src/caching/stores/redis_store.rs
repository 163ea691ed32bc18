//! # Redis Cache Store
//!
//! Shared cache backed by Redis. Every operation clones the multiplexed
//! `ConnectionManager`, so concurrent requests never wait on a lock. The
//! manager reconnects on its own; operations are not retried here.

use super::CacheStore;
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Redis cache implementation
#[derive(Clone)]
pub struct RedisCache {
    connection_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis at `url` (`redis://host:port/db`)
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = Client::open(url)?;
        let connection_manager = ConnectionManager::new(client).await?;

        info!("Redis cache connected to {}", url);

        Ok(Self { connection_manager })
    }
}

/// Millisecond expiry for `PSETEX`; `None` stores without expiry.
///
/// Non-zero TTLs shorter than a millisecond round up so they never turn
/// into a permanent key.
fn expiry_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection_manager.clone();
        let value = conn.get::<_, Option<Vec<u8>>>(key).await?;

        debug!(
            key = %key,
            found = value.is_some(),
            "Redis cache lookup"
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        match expiry_millis(ttl) {
            None => conn.set::<_, _, ()>(key, value).await?,
            Some(millis) => conn.pset_ex::<_, _, ()>(key, value, millis).await?,
        }

        debug!("Set Redis cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Store {
                message: format!("unexpected PING response: {}", response),
            })
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
