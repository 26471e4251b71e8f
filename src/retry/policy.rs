use crate::transport::ItemResponse;
use crate::types::Outcome;
use rand::Rng;
use std::time::Duration;

/// Backoff configuration for retryable outcomes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed per unit, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Pre-jitter delay after the given (1-based) failed attempt: `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before the next attempt, with jitter in `[0, backoff)` and the remote hint applied.
    ///
    /// The hint is capped at `max_delay`; the larger of hint and jittered backoff wins.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        let jitter = if self.jitter && !backoff.is_zero() {
            let nanos = u64::try_from(backoff.as_nanos()).unwrap_or(u64::MAX);
            Duration::from_nanos(rand::rng().random_range(0..nanos))
        } else {
            Duration::ZERO
        };
        let computed = backoff + jitter;
        match hint {
            Some(h) => computed.max(h.min(self.max_delay)),
            None => computed,
        }
    }
}

const NON_TRANSIENT: [u16; 5] = [400, 401, 403, 404, 409];

/// Map one item of a batch response to an attempt outcome.
pub fn classify(item: &ItemResponse) -> Outcome {
    let status = item.status;
    match status {
        200..=299 => Outcome::Success {
            status,
            content: item.content.clone(),
        },
        429 => Outcome::Throttled {
            retry_after: item.retry_after(),
        },
        s if NON_TRANSIENT.contains(&s) => match item.retry_after() {
            Some(hint) => Outcome::Throttled {
                retry_after: Some(hint),
            },
            None => Outcome::PermanentFailure {
                status: Some(status),
                content: item.content.clone(),
            },
        },
        408 | 500..=599 => Outcome::TransportFailure {
            cause: format!("item returned HTTP {}", status),
        },
        _ => Outcome::PermanentFailure {
            status: Some(status),
            content: item.content.clone(),
        },
    }
}
