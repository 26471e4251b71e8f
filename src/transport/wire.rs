//! JSON shapes of the management batch endpoint.

use super::{BatchResponse, ItemResponse};
use crate::batch::BatchEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBatchRequest {
    pub requests: Vec<WireRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub http_method: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBatchResponse {
    #[serde(default)]
    pub responses: Vec<WireResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub http_status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub content_length: Option<u64>,
}

impl From<&BatchEnvelope> for WireBatchRequest {
    fn from(envelope: &BatchEnvelope) -> Self {
        let requests = envelope
            .units
            .iter()
            .map(|u| WireRequest {
                http_method: u.method.as_str().to_string(),
                name: u.key.as_str().to_string(),
                url: u.path.clone(),
                content: u.body.clone(),
            })
            .collect();
        Self { requests }
    }
}

impl From<WireBatchResponse> for BatchResponse {
    fn from(wire: WireBatchResponse) -> Self {
        let items = wire
            .responses
            .into_iter()
            .map(|r| ItemResponse {
                name: r.name,
                status: r.http_status_code,
                // Header values are usually strings, but some services emit numbers.
                headers: r
                    .headers
                    .into_iter()
                    .map(|(k, v)| {
                        let v = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, v)
                    })
                    .collect(),
                content: r.content,
            })
            .collect();
        BatchResponse { items }
    }
}
