//! Bearer token providers.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Source of bearer tokens for batch calls.
///
/// The transport asks for a token once per physical call (send or poll);
/// providers decide for themselves whether to cache.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// Fixed token, mostly for tests and short-lived scripts.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every call.
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub const DEFAULT_VAR: &'static str = "BATCH_BEARER_TOKEN";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self) -> Result<String> {
        match std::env::var(&self.var) {
            Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(Error::configuration_with_context(
                "bearer token not set",
                ErrorContext::new()
                    .with_field_path(self.var.clone())
                    .with_source("env_token_provider"),
            )),
        }
    }
}

/// Caches another provider's token for a fixed time-to-live.
pub struct CachedTokenProvider<P> {
    inner: P,
    ttl: Duration,
    cached: Mutex<Option<(String, Instant)>>,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(token.clone());
            }
        }
        let token = self.inner.token().await?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}
