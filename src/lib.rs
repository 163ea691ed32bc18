//! # Maps Cache Proxy
//!
//! A caching reverse proxy for a maps API. Identical queries are answered
//! from a shared cache; unseen queries are forwarded upstream and their
//! responses stored for the next caller.
//!
//! The interesting part is the cache key: requests are canonicalized before
//! hashing so that the credential, parameter order and (for some endpoints)
//! irrelevant parameters do not fragment the cache.

/// Configuration, error types and the request model
pub mod core;

/// Cache key derivation and cache stores
pub mod caching;

/// Upstream API client
pub mod upstream;

/// Proxy controller and HTTP server
pub mod gateway;

/// Logging, metrics, access log and cache analytics
pub mod observability;

pub use core::config::ProxyConfig;
pub use core::error::{ProxyError, ProxyResult};
pub use core::types::{IncomingRequest, ProxyOutcome};
pub use gateway::{ProxyController, ProxyServer};
