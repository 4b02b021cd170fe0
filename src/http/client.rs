use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::http::request::ResolvedRequest;
use crate::http::response::Response;
use crate::http::types::normalize_url;
use crate::transport::{Transport, TransportError};

/// 默认请求超时
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 基于 reqwest 的 HTTP 传输实现（GraphQL 同样走这里）
#[derive(Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            inner: reqwest::Client::builder().build()?,
            default_timeout: timeout,
        })
    }

    fn build(
        &self,
        request: &ResolvedRequest,
    ) -> std::result::Result<reqwest::RequestBuilder, TransportError> {
        let mut url = normalize_url(&request.url)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut builder = self
            .inner
            .request(request.method.to_reqwest(), url)
            .timeout(timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(credentials) = &request.basic_auth {
            builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<Response, TransportError> {
        let builder = self.build(request)?;
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let start = Instant::now();
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        v.to_str().unwrap_or("").to_string(),
                    )
                })
                .collect();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(url = %request.url, "HTTP call aborted by cancellation");
                Err(TransportError::Cancelled)
            }
            outcome = exchange => {
                let duration = start.elapsed();
                match outcome {
                    Ok((status, headers, body)) => Response::new(status, headers, body, duration)
                        .map_err(|e| TransportError::Network(e.to_string())),
                    Err(e) => Err(classify_error(&e, timeout)),
                }
            }
        }
    }
}

fn classify_error(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
