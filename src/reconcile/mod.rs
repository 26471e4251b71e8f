//! 结果汇总模块：按关联键合并各批次、各次尝试的结果。
//!
//! # Result Reconciliation Module
//!
//! Collects the terminal [`Outcome`] of every unit, whichever envelope or
//! attempt produced it, and keeps the run counters. A snapshot can be taken at
//! any time for progress reporting.

mod report;

pub use report::{RunReport, RunStatistics, UnitResult};

use crate::types::{CorrelationKey, Outcome};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ResultReconciler {
    order: Vec<CorrelationKey>,
    results: HashMap<CorrelationKey, UnitResult>,
    stats: RunStatistics,
    started: Instant,
    deadline: Option<Instant>,
}

impl ResultReconciler {
    pub fn new(order: Vec<CorrelationKey>, deadline: Option<Duration>) -> Self {
        let started = Instant::now();
        let stats = RunStatistics {
            submitted: order.len() as u64,
            ..RunStatistics::default()
        };
        Self {
            order,
            results: HashMap::new(),
            stats,
            started,
            deadline: deadline.map(|d| started + d),
        }
    }

    /// Record a terminal outcome. A later outcome for the same key replaces the earlier one.
    pub fn record(&mut self, key: CorrelationKey, outcome: Outcome, attempts: u32) {
        if !outcome.is_terminal() {
            return;
        }
        self.bump(&outcome, 1);
        if let Some(previous) = self.results.insert(key, UnitResult { outcome, attempts }) {
            self.bump(&previous.outcome, -1);
        }
    }

    fn bump(&mut self, outcome: &Outcome, delta: i64) {
        let counter = match outcome {
            Outcome::Success { .. } => &mut self.stats.succeeded,
            Outcome::PermanentFailure { .. } => &mut self.stats.permanently_failed,
            Outcome::Cancelled => &mut self.stats.cancelled,
            _ => return,
        };
        *counter = counter.saturating_add_signed(delta);
    }

    pub fn note_throttled(&mut self) {
        self.stats.throttled += 1;
    }

    pub fn note_transport_failure(&mut self) {
        self.stats.transport_failures += 1;
    }

    pub fn note_retry(&mut self) {
        self.stats.retries += 1;
    }

    pub fn note_envelope(&mut self) {
        self.stats.envelopes_sent += 1;
    }

    pub fn set_batch_size_reductions(&mut self, n: u32) {
        self.stats.batch_size_reductions = n;
    }

    pub fn set_peak_in_flight(&mut self, n: usize) {
        self.stats.peak_in_flight = n;
    }

    pub fn settled(&self) -> usize {
        self.results.len()
    }

    /// True once every submitted key has a terminal outcome, or the deadline has passed.
    pub fn is_complete(&self) -> bool {
        let all_settled = self.order.iter().all(|k| self.results.contains_key(k));
        all_settled || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Current mapping and counters.
    pub fn snapshot(&self) -> RunReport {
        let mut stats = self.stats.clone();
        stats.elapsed = self.started.elapsed();
        RunReport::new(self.order.clone(), self.results.clone(), stats)
    }

    pub fn finish(self) -> RunReport {
        let mut stats = self.stats;
        stats.elapsed = self.started.elapsed();
        RunReport::new(self.order, self.results, stats)
    }
}
