//! Run configuration.

use crate::dispatch::DispatchConfig;
use crate::retry::RetryPolicy;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Options for one orchestration run.
///
/// Durations are (de)serialized as milliseconds under `*_ms` keys:
///
/// ```yaml
/// max_batch_size: 20
/// concurrency_limit: 4
/// max_attempts: 5
/// base_delay_ms: 500
/// max_delay_ms: 30000
/// deadline_ms: 600000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub max_batch_size: usize,
    pub concurrency_limit: usize,
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    #[serde(rename = "deadline_ms", with = "opt_duration_ms")]
    pub deadline: Option<Duration>,
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    #[serde(rename = "poll_timeout_ms", with = "duration_ms")]
    pub poll_timeout: Duration,
    pub jitter: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 20,
            concurrency_limit: 5,
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            deadline: None,
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn with_concurrency_limit(mut self, n: usize) -> Self {
        self.concurrency_limit = n;
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    pub fn with_deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(d);
        self
    }

    pub fn with_poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn with_poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Parse options from YAML (or JSON, which YAML accepts).
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Overlay values from the environment. Unparseable values are ignored.
    ///
    /// - `BATCH_MAX_SIZE`, `BATCH_CONCURRENCY`, `BATCH_MAX_ATTEMPTS`
    /// - `BATCH_BASE_DELAY_MS`, `BATCH_MAX_DELAY_MS`, `BATCH_DEADLINE_MS`
    pub fn with_env_overrides(mut self) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
        }
        if let Some(n) = var("BATCH_MAX_SIZE") {
            self.max_batch_size = n;
        }
        if let Some(n) = var("BATCH_CONCURRENCY") {
            self.concurrency_limit = n;
        }
        if let Some(n) = var("BATCH_MAX_ATTEMPTS") {
            self.max_attempts = n;
        }
        if let Some(ms) = var::<u64>("BATCH_BASE_DELAY_MS") {
            self.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = var::<u64>("BATCH_MAX_DELAY_MS") {
            self.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = var::<u64>("BATCH_DEADLINE_MS") {
            self.deadline = Some(Duration::from_millis(ms));
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &str, msg: &str, details: String) -> Error {
            Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("options.{}", field))
                    .with_details(details)
                    .with_source("run_options"),
            )
        }
        if self.max_batch_size == 0 {
            return Err(invalid("max_batch_size", "max_batch_size must be >= 1", "got 0".into()));
        }
        if self.concurrency_limit == 0 {
            return Err(invalid("concurrency_limit", "concurrency_limit must be >= 1", "got 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "max_attempts must be >= 1", "got 0".into()));
        }
        if self.max_delay < self.base_delay {
            return Err(invalid(
                "max_delay_ms",
                "max_delay must not be smaller than base_delay",
                format!("base {:?}, max {:?}", self.base_delay, self.max_delay),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval_ms", "poll_interval must be > 0", "got 0".into()));
        }
        if self.poll_timeout < self.poll_interval {
            return Err(invalid(
                "poll_timeout_ms",
                "poll_timeout must not be smaller than poll_interval",
                format!("interval {:?}, timeout {:?}", self.poll_interval, self.poll_timeout),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            concurrency_limit: self.concurrency_limit,
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
