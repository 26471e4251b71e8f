//! Request unit definitions

use crate::{Error, ErrorContext};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-supplied key that identifies a unit for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CorrelationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for CorrelationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// HTTP verbs accepted by the batch endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(Error::configuration_with_context(
                format!("unsupported HTTP method '{}'", other),
                ErrorContext::new()
                    .with_field_path("unit.method")
                    .with_source("request_unit"),
            )),
        }
    }
}

// Accepts the same spellings as `FromStr`.
impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One logical unit of work.
///
/// `path` is resource-relative (e.g. `/subscriptions/{id}/resourceGroups?api-version=2021-04-01`);
/// the transport turns it into whatever URL form the batch endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUnit {
    pub key: CorrelationKey,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl RequestUnit {
    pub fn new(key: impl Into<CorrelationKey>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(key: impl Into<CorrelationKey>, path: impl Into<String>) -> Self {
        Self::new(key, HttpMethod::Get, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Patch ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        let err = "TRACE".parse::<HttpMethod>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unit_deserializes_from_wire_like_json() {
        let unit: RequestUnit = serde_json::from_value(serde_json::json!({
            "key": "rg-list",
            "method": "GET",
            "path": "/subscriptions/abc/resourceGroups?api-version=2021-04-01"
        }))
        .unwrap();
        assert_eq!(unit.key, CorrelationKey::from("rg-list"));
        assert_eq!(unit.method, HttpMethod::Get);
        assert!(unit.body.is_none());
    }

    #[test]
    fn test_method_deserializes_in_any_case() {
        let unit: RequestUnit = serde_json::from_value(serde_json::json!({
            "key": "k",
            "method": "get",
            "path": "/x"
        }))
        .unwrap();
        assert_eq!(unit.method, HttpMethod::Get);

        let patch: HttpMethod = serde_json::from_str(r#""Patch""#).unwrap();
        assert_eq!(patch, HttpMethod::Patch);
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#""PATCH""#);

        let err = serde_json::from_str::<HttpMethod>(r#""trace""#).unwrap_err();
        assert!(err.to_string().contains("unsupported HTTP method"), "{err}");
    }

    #[test]
    fn test_builder_sets_body() {
        let unit = RequestUnit::new("k", HttpMethod::Put, "/x").with_body(serde_json::json!({"a": 1}));
        assert_eq!(unit.body, Some(serde_json::json!({"a": 1})));
        assert_eq!(unit.key.to_string(), "k");
    }
}
