use crate::types::{CorrelationKey, Outcome};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Terminal outcome of one unit plus the attempts it took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitResult {
    pub outcome: Outcome,
    pub attempts: u32,
}

/// Aggregate health of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub submitted: u64,
    pub succeeded: u64,
    /// Throttling incidents observed (429s), across all attempts.
    pub throttled: u64,
    pub permanently_failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub envelopes_sent: u64,
    /// Per-unit transport failures observed, across all attempts.
    pub transport_failures: u64,
    pub batch_size_reductions: u32,
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

impl RunStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.submitted == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.submitted as f64
        }
    }
}

/// Keyed results of a run, in submission order when iterated.
#[derive(Debug, Clone)]
pub struct RunReport {
    order: Vec<CorrelationKey>,
    results: HashMap<CorrelationKey, UnitResult>,
    pub stats: RunStatistics,
}

impl RunReport {
    pub(crate) fn new(
        order: Vec<CorrelationKey>,
        results: HashMap<CorrelationKey, UnitResult>,
        stats: RunStatistics,
    ) -> Self {
        Self {
            order,
            results,
            stats,
        }
    }

    pub fn get(&self, key: &CorrelationKey) -> Option<&UnitResult> {
        self.results.get(key)
    }

    pub fn outcome(&self, key: &CorrelationKey) -> Option<&Outcome> {
        self.results.get(key).map(|r| &r.outcome)
    }

    /// Settled units in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&CorrelationKey, &UnitResult)> + '_ {
        self.order
            .iter()
            .filter_map(move |k| self.results.get(k).map(|r| (k, r)))
    }

    /// Number of settled units.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Submitted units without a terminal outcome yet (only non-zero for snapshots).
    pub fn pending(&self) -> usize {
        self.order.len().saturating_sub(self.results.len())
    }

    pub fn all_succeeded(&self) -> bool {
        self.pending() == 0 && self.results.values().all(|r| r.outcome.is_success())
    }

    pub fn into_outcomes(self) -> HashMap<CorrelationKey, Outcome> {
        self.results
            .into_iter()
            .map(|(k, r)| (k, r.outcome))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_follows_submission_order() {
        let order: Vec<CorrelationKey> = vec!["z".into(), "a".into(), "m".into()];
        let results = order
            .iter()
            .map(|k| {
                (
                    k.clone(),
                    UnitResult {
                        outcome: Outcome::Success { status: 200, content: None },
                        attempts: 1,
                    },
                )
            })
            .collect();
        let report = RunReport::new(order, results, RunStatistics::default());
        let keys: Vec<&str> = report.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert!(report.all_succeeded());
        assert_eq!(report.into_outcomes().len(), 3);
    }

    #[test]
    fn test_success_rate() {
        let stats = RunStatistics {
            submitted: 4,
            succeeded: 3,
            ..RunStatistics::default()
        };
        assert!((stats.success_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(RunStatistics::default().success_rate(), 0.0);
    }
}
