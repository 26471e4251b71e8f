//! 传输层模块：批处理端点的调用抽象、线路格式和认证。
//!
//! # Transport Module
//!
//! The orchestrator core never talks HTTP directly. It consumes a
//! [`BatchTransport`], which sends one physical batch call and reports either a
//! batch-level response (one item per unit) or a batch-level failure.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`BatchTransport`] | Capability consumed by the dispatcher |
//! | [`TransportReply`] | Completed response, or a deferred-result location to poll |
//! | [`TransportError`] | Whole-call failure; applies to every unit in the envelope |
//! | [`HttpBatchTransport`] | reqwest implementation of the management batch endpoint |
//! | [`auth`] | Bearer token providers |

pub mod auth;
mod http;
pub mod wire;

pub use auth::{CachedTokenProvider, EnvTokenProvider, StaticTokenProvider, TokenProvider};
pub use http::HttpBatchTransport;

use crate::batch::BatchEnvelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Response for one unit inside a batch response.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResponse {
    /// Echo of the request name; the orchestrator uses the correlation key here.
    pub name: Option<String>,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub content: Option<serde_json::Value>,
}

impl ItemResponse {
    pub fn new(name: impl Into<String>, status: u16) -> Self {
        Self {
            name: Some(name.into()),
            status,
            headers: HashMap::new(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after").and_then(parse_retry_after)
    }
}

/// Batch-level response: one entry per submitted unit, matched by name or position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    pub items: Vec<ItemResponse>,
}

impl BatchResponse {
    pub fn new(items: Vec<ItemResponse>) -> Self {
        Self { items }
    }
}

/// What a single transport call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportReply {
    Completed(BatchResponse),
    /// The remote accepted the batch and wants the caller to poll `location`.
    Deferred {
        location: String,
        retry_after: Option<Duration>,
    },
}

/// Failure of a whole batch call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("batch call returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("batch call throttled (HTTP 429)")]
    Throttled { retry_after: Option<Duration> },

    #[error("batch payload rejected with HTTP {status}: {body}")]
    PayloadRejected { status: u16, body: String },

    #[error("malformed batch response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("deferred batch result not ready after {0:?}")]
    PollTimeout(Duration),
}

impl TransportError {
    pub fn is_payload_rejection(&self) -> bool {
        matches!(self, TransportError::PayloadRejected { .. })
    }
}

/// Capability that performs physical batch calls.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Send one envelope as a single batch call.
    async fn send(&self, envelope: &BatchEnvelope) -> Result<TransportReply, TransportError>;

    /// Follow up on a deferred result.
    async fn poll(&self, location: &str) -> Result<TransportReply, TransportError>;
}

/// Best-effort parsing of `Retry-After`.
///
/// Only the `Retry-After: <seconds>` form is supported.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: u64 = raw.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_item_header_lookup_ignores_case() {
        let item = ItemResponse::new("a", 429).with_header("Retry-After", "3");
        assert_eq!(item.header("retry-after"), Some("3"));
        assert_eq!(item.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_payload_rejection_flag() {
        let e = TransportError::PayloadRejected { status: 413, body: String::new() };
        assert!(e.is_payload_rejection());
        assert!(!TransportError::Network("reset".into()).is_payload_rejection());
    }
}
