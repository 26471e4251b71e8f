use super::wire::{WireBatchRequest, WireBatchResponse};
use super::{parse_retry_after, BatchResponse, BatchTransport, TokenProvider, TransportError, TransportReply};
use crate::batch::BatchEnvelope;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// reqwest-backed transport for a management batch endpoint.
///
/// Sends `POST {base_url}{batch_path}?api-version={api_version}` with the
/// `{"requests": [...]}` body and understands the 202 + `Location` deferred form.
pub struct HttpBatchTransport {
    client: reqwest::Client,
    base_url: Url,
    batch_path: String,
    api_version: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBatchTransport {
    pub const DEFAULT_BASE_URL: &'static str = "https://management.azure.com";
    pub const DEFAULT_BATCH_PATH: &'static str = "/batch";
    pub const DEFAULT_API_VERSION: &'static str = "2020-06-01";

    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url: {}", e),
                ErrorContext::new()
                    .with_field_path("transport.base_url")
                    .with_details(base_url.to_string())
                    .with_source("http_transport"),
            )
        })?;

        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("BATCH_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("BATCH_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(16),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("BATCH_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(TransportError::Http)?;

        Ok(Self {
            client,
            base_url,
            batch_path: Self::DEFAULT_BATCH_PATH.to_string(),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            tokens,
        })
    }

    pub fn with_batch_path(mut self, path: impl Into<String>) -> Self {
        self.batch_path = path.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    fn batch_url(&self) -> std::result::Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(&self.batch_path)
            .map_err(|e| TransportError::Malformed(format!("batch url: {}", e)))?;
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// `Location` may be absolute or relative to the base url.
    fn resolve_location(&self, location: &str) -> std::result::Result<Url, TransportError> {
        Url::parse(location)
            .or_else(|_| self.base_url.join(location))
            .map_err(|e| TransportError::Malformed(format!("location '{}': {}", location, e)))
    }

    async fn bearer(&self) -> std::result::Result<String, TransportError> {
        self.tokens
            .token()
            .await
            .map_err(|e| TransportError::Auth(e.to_string()))
    }

    fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
        for name in names {
            if let Some(v) = headers.get(*name) {
                if let Ok(s) = v.to_str() {
                    let s = s.trim();
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
        None
    }

    async fn read_reply(
        &self,
        resp: reqwest::Response,
    ) -> std::result::Result<TransportReply, TransportError> {
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let retry_after = Self::header_first(&headers, &["retry-after"]).and_then(|s| parse_retry_after(&s));

        match status {
            202 => {
                let location = Self::header_first(&headers, &["location", "azure-asyncoperation"])
                    .ok_or_else(|| TransportError::Malformed("202 without Location header".into()))?;
                debug!(location = location.as_str(), "batch accepted, result deferred");
                Ok(TransportReply::Deferred {
                    location,
                    retry_after,
                })
            }
            200..=299 => {
                let body = resp.text().await?;
                let wire: WireBatchResponse = serde_json::from_str(&body)
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;
                Ok(TransportReply::Completed(BatchResponse::from(wire)))
            }
            429 => Err(TransportError::Throttled { retry_after }),
            400 | 413 => {
                let body = resp.text().await.unwrap_or_default();
                Err(TransportError::PayloadRejected { status, body })
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                let upstream = Self::header_first(&headers, &["x-ms-request-id", "x-request-id"]);
                info!(
                    http_status = status,
                    upstream_request_id = upstream.as_deref().unwrap_or(""),
                    "batch call failed"
                );
                Err(TransportError::Status { status, body })
            }
        }
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn send(&self, envelope: &BatchEnvelope) -> std::result::Result<TransportReply, TransportError> {
        let url = self.batch_url()?;
        let token = self.bearer().await?;
        let body = WireBatchRequest::from(envelope);

        debug!(envelope_id = %envelope.id, size = envelope.len(), url = url.as_str(), "sending batch");
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        self.read_reply(resp).await
    }

    async fn poll(&self, location: &str) -> std::result::Result<TransportReply, TransportError> {
        let url = self.resolve_location(location)?;
        let token = self.bearer().await?;
        let resp = self.client.get(url).bearer_auth(token).send().await?;
        self.read_reply(resp).await
    }
}
