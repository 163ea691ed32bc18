//! # Cache Analytics
//!
//! Sampled cache hit/miss events written to InfluxDB v2 as line protocol.
//!
//! Emission is fire-and-forget: [`AnalyticsRecorder::emit`] spawns the write
//! and returns immediately. Failures are logged and dropped. Events are only
//! produced for requests that carried a credential, and the credential is
//! obfuscated before it leaves the process.

use crate::caching::CacheKey;
use crate::core::config::ObservabilityConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::IncomingRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Organization used when the DSN does not name one
pub const DEFAULT_INFLUX_ORG: &str = "ignored";

const INFLUX_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid InfluxDB DSN: {0}")]
    InvalidDsn(String),

    #[error("Analytics write failed: {0}")]
    Write(String),
}

impl From<AnalyticsError> for ProxyError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::InvalidDsn(message) => ProxyError::Configuration {
                message: format!("Invalid INFLUX_DSN: {}", message),
            },
            AnalyticsError::Write(message) => ProxyError::Analytics { message },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    Hit,
    Miss,
}

impl CacheEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// One sampled cache event
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    /// Request path
    pub api: String,
    /// Obfuscated credential
    pub api_key: String,
    pub cache_key: String,
    pub timestamp: DateTime<Utc>,
}

impl CacheEvent {
    /// InfluxDB line protocol with nanosecond precision
    pub fn to_line_protocol(&self) -> String {
        format!(
            "cache_event,event={} api=\"{}\",api_key=\"{}\",cache_key=\"{}\" {}",
            self.kind.as_str(),
            escape_field(&self.api),
            escape_field(&self.api_key),
            escape_field(&self.cache_key),
            self.timestamp.timestamp_nanos_opt().unwrap_or_default()
        )
    }
}

fn escape_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Show the first and last four characters of a credential.
///
/// Credentials of eight characters or fewer are returned as-is.
pub fn obfuscate_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return credential.to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Decides whether an event is recorded
pub trait Sampler: Send + Sync {
    fn sample(&self) -> bool;
}

/// Samples a fixed fraction of events
#[derive(Debug, Clone, Copy)]
pub struct RateSampler {
    rate: f64,
}

impl RateSampler {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
        }
    }
}

impl Sampler for RateSampler {
    fn sample(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        rand::random::<f64>() <= self.rate
    }
}

/// Destination for cache events
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: &CacheEvent) -> Result<(), AnalyticsError>;
}

/// Connection details parsed from `scheme://host[:port]?org=&bucket=&token=`
#[derive(Clone, PartialEq, Eq)]
pub struct InfluxDsn {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

impl fmt::Debug for InfluxDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxDsn")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl InfluxDsn {
    pub fn parse(dsn: &str) -> Result<Self, AnalyticsError> {
        let parsed = Url::parse(dsn).map_err(|e| AnalyticsError::InvalidDsn(e.to_string()))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| AnalyticsError::InvalidDsn("missing host".to_string()))?;
        let url = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };

        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(key, value)| key == name && !value.is_empty())
                .map(|(_, value)| value.into_owned())
        };

        let bucket = param("bucket")
            .ok_or_else(|| AnalyticsError::InvalidDsn("missing bucket".to_string()))?;
        let token = param("token")
            .ok_or_else(|| AnalyticsError::InvalidDsn("missing token".to_string()))?;
        let org = param("org").unwrap_or_else(|| DEFAULT_INFLUX_ORG.to_string());

        Ok(Self {
            url,
            org,
            bucket,
            token,
        })
    }
}

/// InfluxDB v2 write API sink
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    dsn: InfluxDsn,
}

impl InfluxSink {
    pub fn new(dsn: InfluxDsn) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(INFLUX_WRITE_TIMEOUT)
            .build()
            .map_err(|e| ProxyError::config(format!("Failed to build InfluxDB client: {}", e)))?;

        Ok(Self { client, dsn })
    }
}

#[async_trait]
impl AnalyticsSink for InfluxSink {
    async fn record(&self, event: &CacheEvent) -> Result<(), AnalyticsError> {
        self.client
            .post(format!("{}/api/v2/write", self.dsn.url))
            .query(&[
                ("org", self.dsn.org.as_str()),
                ("bucket", self.dsn.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.dsn.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(event.to_line_protocol())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AnalyticsError::Write(e.to_string()))?;

        Ok(())
    }
}

/// Samples, builds and dispatches cache events
#[derive(Clone)]
pub struct AnalyticsRecorder {
    sink: Arc<dyn AnalyticsSink>,
    sampler: Arc<dyn Sampler>,
}

impl AnalyticsRecorder {
    pub fn new(sink: Arc<dyn AnalyticsSink>, sampler: Arc<dyn Sampler>) -> Self {
        Self { sink, sampler }
    }

    /// Build the Influx recorder, or `None` when analytics is not configured
    pub fn from_config(config: &ObservabilityConfig) -> ProxyResult<Option<Self>> {
        let dsn = match config.influx_dsn.as_deref() {
            Some(dsn) if config.influx_sample_rate > 0.0 => dsn,
            _ => return Ok(None),
        };

        let dsn = InfluxDsn::parse(dsn)?;
        debug!(dsn = ?dsn, "InfluxDB analytics enabled");

        let sink = InfluxSink::new(dsn)?;
        Ok(Some(Self::new(
            Arc::new(sink),
            Arc::new(RateSampler::new(config.influx_sample_rate)),
        )))
    }

    /// Spawn the write for one event. Returns `None` when nothing was sent.
    pub fn emit(
        &self,
        kind: CacheEventKind,
        request: &IncomingRequest,
        cache_key: &CacheKey,
    ) -> Option<JoinHandle<()>> {
        let credential = request.credential()?;
        if !self.sampler.sample() {
            return None;
        }

        let event = CacheEvent {
            kind,
            api: request.path().to_string(),
            api_key: obfuscate_credential(&credential),
            cache_key: cache_key.to_string(),
            timestamp: Utc::now(),
        };

        let sink = self.sink.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = sink.record(&event).await {
                warn!(error = %e, event = event.kind.as_str(), "Failed to record cache event");
            }
        }))
    }
}
