use super::RetryPolicy;
use crate::types::{CorrelationKey, Outcome};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Lifecycle state of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    InFlight,
    Succeeded,
    Throttled,
    TransportFailed,
    PermanentlyFailed,
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitState::Succeeded | UnitState::PermanentlyFailed | UnitState::Cancelled
        )
    }
}

/// Per-unit bookkeeping for the whole run.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub state: UnitState,
    pub attempts: u32,
    pub not_before: Option<Instant>,
    pub last_outcome: Option<Outcome>,
}

impl AttemptRecord {
    fn new() -> Self {
        Self {
            state: UnitState::Pending,
            attempts: 0,
            not_before: None,
            last_outcome: None,
        }
    }

    fn settle(&mut self, state: UnitState, outcome: &Outcome) {
        self.state = state;
        self.not_before = None;
        self.last_outcome = Some(outcome.clone());
    }
}

/// What to do with a unit after one of its attempts finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Terminal success.
    Accept { outcome: Outcome, attempts: u32 },
    /// Put the unit back in the pending set, eligible again at `not_before`.
    Retry {
        not_before: Instant,
        delay: Duration,
        attempts: u32,
    },
    /// Terminal failure (permanent, exhausted or cancelled).
    Fail { outcome: Outcome, attempts: u32 },
}

impl Decision {
    pub fn attempts(&self) -> u32 {
        match self {
            Decision::Accept { attempts, .. }
            | Decision::Retry { attempts, .. }
            | Decision::Fail { attempts, .. } => *attempts,
        }
    }
}

/// Sole owner of unit attempt state during a run.
///
/// A unit is either pending, waiting out a delay, or in exactly one in-flight
/// envelope until it settles. `mark_in_flight` refuses a unit that is already in
/// flight or settled.
#[derive(Debug)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
    records: HashMap<CorrelationKey, AttemptRecord>,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn register(&mut self, key: CorrelationKey) {
        self.records.insert(key, AttemptRecord::new());
    }

    pub fn record(&self, key: &CorrelationKey) -> Option<&AttemptRecord> {
        self.records.get(key)
    }

    /// Units that have not reached a terminal state yet.
    pub fn unsettled(&self) -> usize {
        self.records.values().filter(|r| !r.state.is_terminal()).count()
    }

    /// Start a new attempt. Returns the attempt number, or `None` if the unit is
    /// unknown, already settled or already in flight.
    pub fn mark_in_flight(&mut self, key: &CorrelationKey) -> Option<u32> {
        let rec = self.records.get_mut(key)?;
        if rec.state == UnitState::InFlight || rec.state.is_terminal() {
            return None;
        }
        rec.state = UnitState::InFlight;
        rec.attempts += 1;
        rec.not_before = None;
        Some(rec.attempts)
    }

    /// Apply the outcome of the unit's current attempt.
    pub fn on_outcome(&mut self, key: &CorrelationKey, outcome: Outcome, now: Instant) -> Decision {
        let Some(rec) = self.records.get_mut(key) else {
            // Unknown keys only happen if a transport echoes a stray name; treat as settled.
            return Decision::Fail { outcome, attempts: 0 };
        };
        let attempts = rec.attempts;
        if rec.state.is_terminal() {
            return Decision::Fail { outcome, attempts };
        }

        let hint = match &outcome {
            Outcome::Success { .. } => {
                rec.settle(UnitState::Succeeded, &outcome);
                return Decision::Accept { outcome, attempts };
            }
            Outcome::PermanentFailure { .. } => {
                rec.settle(UnitState::PermanentlyFailed, &outcome);
                return Decision::Fail { outcome, attempts };
            }
            Outcome::Cancelled => {
                rec.settle(UnitState::Cancelled, &outcome);
                return Decision::Fail { outcome, attempts };
            }
            Outcome::Throttled { retry_after } => {
                rec.state = UnitState::Throttled;
                *retry_after
            }
            Outcome::TransportFailure { .. } => {
                rec.state = UnitState::TransportFailed;
                None
            }
        };

        if attempts >= self.policy.max_attempts {
            let exhausted = match &outcome {
                Outcome::Throttled { .. } => Outcome::PermanentFailure {
                    status: Some(429),
                    content: None,
                },
                Outcome::TransportFailure { cause } => Outcome::PermanentFailure {
                    status: None,
                    content: Some(serde_json::json!({ "error": cause })),
                },
                other => other.clone(),
            };
            debug!(key = %key, attempts, "retry budget exhausted");
            rec.settle(UnitState::PermanentlyFailed, &exhausted);
            return Decision::Fail {
                outcome: exhausted,
                attempts,
            };
        }

        let delay = self.policy.delay_for(attempts, hint);
        let not_before = now + delay;
        rec.state = UnitState::Pending;
        rec.not_before = Some(not_before);
        rec.last_outcome = Some(outcome);
        Decision::Retry {
            not_before,
            delay,
            attempts,
        }
    }

    /// Move a pending unit's earliest retry time, e.g. to line it up with the
    /// rest of its envelope.
    pub fn reschedule(&mut self, key: &CorrelationKey, not_before: Instant) {
        if let Some(rec) = self.records.get_mut(key) {
            if rec.state == UnitState::Pending {
                rec.not_before = Some(not_before);
            }
        }
    }

    /// Settle a unit as cancelled. Returns the attempts it had used.
    ///
    /// A unit that already reached a terminal state keeps it.
    pub fn cancel(&mut self, key: &CorrelationKey) -> u32 {
        match self.records.get_mut(key) {
            Some(rec) => {
                if !rec.state.is_terminal() {
                    rec.settle(UnitState::Cancelled, &Outcome::Cancelled);
                }
                rec.attempts
            }
            None => 0,
        }
    }
}
