use super::{build_outbound_uri, redact_credential, UpstreamError, UpstreamFetcher, UpstreamResponse};
use crate::core::config::UpstreamConfig;
use crate::core::error::{ProxyError, ProxyResult};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::time::Instant;
use tracing::{debug, info};

/// Upstream fetcher over a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    verbose: bool,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProxyError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            verbose: config.verbose_logging,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl UpstreamFetcher for HttpUpstream {
    async fn fetch(
        &self,
        request_uri: &str,
        credential: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = build_outbound_uri(&self.base_url, request_uri, credential);

        if self.verbose {
            info!(uri = %redact_credential(&url), "Proxying request to upstream");
        }

        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.without_url().to_string()))?;

        // reqwest 0.11 still speaks http 0.2; convert into the server's types
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = convert_headers(response.headers());

        if self.verbose {
            let names: Vec<&str> = headers.keys().map(|name| name.as_str()).collect();
            info!(status = status.as_u16(), headers = ?names, "Upstream responded");
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::BodyRead(e.without_url().to_string()))?;

        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upstream fetch complete"
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn convert_headers(source: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(base_url: &str) -> HttpUpstream {
        HttpUpstream::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            verbose_logging: true,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("location", "NewYork"))
            .and(query_param("key", "abc123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"{"status":"OK"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = upstream(&server.uri())
            .fetch("/query?location=NewYork", Some("abc123"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(&response.body[..], br#"{"status":"OK"}"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let response = upstream(&server.uri()).fetch("/query", None).await.unwrap();
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(&response.body[..], b"denied");
    }

    #[tokio::test]
    async fn test_transport_error() {
        let result = upstream("http://127.0.0.1:1").fetch("/query", None).await;
        assert!(matches!(result, Err(UpstreamError::Transport(_))));
    }

    #[tokio::test]
    async fn test_truncated_body_is_body_read_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let result = upstream(&format!("http://{}", addr))
            .fetch("/query", None)
            .await;
        assert!(matches!(result, Err(UpstreamError::BodyRead(_))));
    }
}
