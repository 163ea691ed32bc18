//! # Configuration Module
//!
//! Configuration for the caching proxy.
//!
//! ## Key Features
//! - YAML configuration parsing with serde (every field has a default)
//! - Environment variable overrides using the variable names of the existing
//!   container deployment (`REDIS_HOST`, `BASE_URL`, `CACHE_TIMEOUT_HOURS`, ...)
//! - Validation that collects every problem into a single error

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{ProxyError, ProxyResult};

/// Main proxy configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Upstream API settings
    pub upstream: UpstreamConfig,

    /// Cache store and cache policy settings
    pub cache: CacheConfig,

    /// Logging, metrics and analytics settings
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let mut config = Self::read_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file without consulting the environment
    pub async fn read_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyError::config(format!("Failed to read config file: {}", e)))?;

        let config: ProxyConfig = serde_yaml::from_str(&content)
            .map_err(|e| ProxyError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> ProxyResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> ProxyResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored, matching how the container entrypoint leaves
    /// unset variables as empty strings.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ProxyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(port) = var("SERVER_PORT") {
            self.server.port = parse_var("SERVER_PORT", &port)?;
        }
        if let Some(addr) = var("BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(base_url) = var("BASE_URL") {
            self.upstream.base_url = base_url;
        }
        if let Some(timeout) = var("UPSTREAM_TIMEOUT") {
            self.upstream.timeout = parse_duration_var("UPSTREAM_TIMEOUT", &timeout)?;
        }
        if let Some(verbose) = var("VERBOSE_LOGGING") {
            self.upstream.verbose_logging = parse_bool_var("VERBOSE_LOGGING", &verbose)?;
        }

        if let Some(backend) = var("CACHE_BACKEND") {
            self.cache.backend = match backend.to_lowercase().as_str() {
                "redis" => CacheBackend::Redis,
                "memory" => CacheBackend::Memory,
                other => {
                    return Err(ProxyError::config(format!(
                        "Invalid CACHE_BACKEND: {} (expected redis or memory)",
                        other
                    )))
                }
            };
        }
        if let Some(host) = var("REDIS_HOST") {
            self.cache.redis_host = host;
        }
        if let Some(port) = var("REDIS_PORT") {
            self.cache.redis_port = parse_var("REDIS_PORT", &port)?;
        }
        if let Some(db) = var("REDIS_DB") {
            self.cache.redis_db = parse_var("REDIS_DB", &db)?;
        }
        if let Some(prefix) = var("REDIS_PREFIX") {
            self.cache.key_prefix = prefix;
        }
        if let Some(hours) = var("CACHE_TIMEOUT_HOURS") {
            let hours: u64 = parse_var("CACHE_TIMEOUT_HOURS", &hours)?;
            let seconds = hours.checked_mul(3600).ok_or_else(|| {
                ProxyError::config(format!("Invalid CACHE_TIMEOUT_HOURS: {} is too large", hours))
            })?;
            self.cache.ttl = Duration::from_secs(seconds);
        }
        if let Some(timeout) = var("REDIS_TIMEOUT") {
            self.cache.operation_timeout = parse_duration_var("REDIS_TIMEOUT", &timeout)?;
        }
        if let Some(codes) = var("CACHEABLE_STATUS_CODES") {
            self.cache.cacheable_status_codes = codes
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| parse_var("CACHEABLE_STATUS_CODES", code))
                .collect::<ProxyResult<Vec<u16>>>()?;
        }

        if let Some(format) = var("LOG_FORMAT") {
            self.observability.log_format = LogFormat::from_env_value(&format);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(dsn) = var("INFLUX_DSN") {
            self.observability.influx_dsn = Some(dsn);
        }
        if let Some(rate) = var("INFLUX_SAMPLE_RATE") {
            self.observability.influx_sample_rate = parse_var("INFLUX_SAMPLE_RATE", &rate)?;
        }
        if let Some(suffix) = var("REFERRER_STRIP_SUFFIX") {
            self.observability.referrer_strip_suffix = Some(suffix);
        }

        Ok(())
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> ProxyResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        match Url::parse(&self.upstream.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!("Unsupported upstream scheme: {}", url.scheme())),
            Err(e) => errors.push(format!("Invalid upstream base_url '{}': {}", self.upstream.base_url, e)),
        }

        if self.upstream.timeout.is_zero() {
            errors.push("upstream timeout must be greater than 0".to_string());
        }

        if self.cache.operation_timeout.is_zero() {
            errors.push("cache operation_timeout must be greater than 0".to_string());
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_host.is_empty() {
            errors.push("redis_host cannot be empty".to_string());
        }

        // Hits are always replayed as 200, so only success bodies may be stored
        for code in &self.cache.cacheable_status_codes {
            if !(200..=299).contains(code) {
                errors.push(format!("Invalid cacheable status code: {} (must be 2xx)", code));
            }
        }

        match self.observability.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.observability.log_level)),
        }

        let rate = self.observability.influx_sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            errors.push(format!(
                "influx_sample_rate must be between 0.0 and 1.0, got: {}",
                rate
            ));
        }

        if !errors.is_empty() {
            return Err(ProxyError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> ProxyResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ProxyError::config(format!("Invalid {}: {}", name, e)))
}

fn parse_duration_var(name: &str, value: &str) -> ProxyResult<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ProxyError::config(format!("Invalid {}: {}", name, e)))
}

fn parse_bool_var(name: &str, value: &str) -> ProxyResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ProxyError::config(format!("Invalid {}: {}", name, other))),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    /// HTTP port
    pub port: u16,

    /// Liveness path; bypasses caching and access logging
    pub health_path: String,

    /// Prometheus exposition path
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            health_path: "/health".to_string(),
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL the request path and query are appended to
    pub base_url: String,

    /// Whole-request timeout, including the body read
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Log every proxied request (credential redacted)
    pub verbose_logging: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com".to_string(),
            timeout: Duration::from_secs(30),
            verbose_logging: false,
        }
    }
}

/// Cache store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    /// Process-local store, for development and tests
    Memory,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    pub redis_host: String,

    pub redis_port: u16,

    pub redis_db: i64,

    /// Namespace prepended to every cache key as `prefix:digest`
    pub key_prefix: String,

    /// Entry time-to-live; zero stores without expiry
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Bound on every store round trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Upstream statuses whose bodies are written to the cache
    pub cacheable_status_codes: Vec<u16>,
}

impl CacheConfig {
    /// Connection URL for the Redis client
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_host: "redis".to_string(),
            redis_port: 6379,
            redis_db: 0,
            key_prefix: String::new(),
            ttl: Duration::from_secs(720 * 3600),
            operation_timeout: Duration::from_secs(1),
            cacheable_status_codes: vec![200],
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// `gcp` and `json` select structured output; anything else is text
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "gcp" | "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    pub log_level: String,

    /// `http(s)://host:port?org=..&bucket=..&token=..`
    pub influx_dsn: Option<String>,

    /// Fraction of cache events sent to the analytics sink
    pub influx_sample_rate: f64,

    /// Host suffix removed from referrers in the access log
    pub referrer_strip_suffix: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
            influx_dsn: None,
            influx_sample_rate: 0.0,
            referrer_strip_suffix: None,
        }
    }
}
