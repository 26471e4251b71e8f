//! Batch partitioning.

use crate::types::{CorrelationKey, RequestUnit};
use crate::{Error, ErrorContext, Result};
use uuid::Uuid;

/// Ordered group of units sent in a single physical batch call.
///
/// Envelopes are built fresh for every submission attempt; a retried unit
/// always travels in a new envelope.
#[derive(Debug, Clone)]
pub struct BatchEnvelope {
    pub id: Uuid,
    pub units: Vec<RequestUnit>,
}

impl BatchEnvelope {
    pub fn new(units: Vec<RequestUnit>) -> Self {
        Self {
            id: Uuid::new_v4(),
            units,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CorrelationKey> + '_ {
        self.units.iter().map(|u| &u.key)
    }
}

/// Split `units` into envelopes of at most `max_batch_size`, preserving order.
///
/// Every envelope is non-empty; only the last may be short. An empty input
/// yields no envelopes.
pub fn partition(units: Vec<RequestUnit>, max_batch_size: usize) -> Result<Vec<BatchEnvelope>> {
    if max_batch_size == 0 {
        return Err(Error::configuration_with_context(
            "max_batch_size must be >= 1",
            ErrorContext::new()
                .with_field_path("options.max_batch_size")
                .with_details("got 0")
                .with_source("batcher"),
        ));
    }

    let mut envelopes = Vec::with_capacity(units.len().div_ceil(max_batch_size));
    let mut current = Vec::with_capacity(max_batch_size.min(units.len()));
    for unit in units {
        current.push(unit);
        if current.len() == max_batch_size {
            envelopes.push(BatchEnvelope::new(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        envelopes.push(BatchEnvelope::new(current));
    }
    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: usize) -> Vec<RequestUnit> {
        (0..n)
            .map(|i| RequestUnit::get(format!("u{i}"), format!("/r/{i}")))
            .collect()
    }

    #[test]
    fn test_partition_sizes() {
        let sizes: Vec<usize> = partition(units(37), 15)
            .unwrap()
            .iter()
            .map(BatchEnvelope::len)
            .collect();
        assert_eq!(sizes, vec![15, 15, 7]);
    }

    #[test]
    fn test_partition_exact_multiple() {
        let envs = partition(units(20), 10).unwrap();
        assert_eq!(envs.len(), 2);
        assert!(envs.iter().all(|e| e.len() == 10));
    }

    #[test]
    fn test_partition_preserves_order_and_units() {
        let input = units(23);
        for size in 1..=25 {
            let envs = partition(input.clone(), size).unwrap();
            assert!(envs.iter().all(|e| !e.is_empty() && e.len() <= size));
            let flat: Vec<RequestUnit> = envs.into_iter().flat_map(|e| e.units).collect();
            assert_eq!(flat, input, "size {size}");
        }
    }

    #[test]
    fn test_partition_empty_input() {
        assert!(partition(Vec::new(), 5).unwrap().is_empty());
    }

    #[test]
    fn test_partition_rejects_zero_size() {
        let err = partition(units(3), 0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_envelopes_get_distinct_ids() {
        let envs = partition(units(4), 1).unwrap();
        let mut ids: Vec<_> = envs.iter().map(|e| e.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert_eq!(envs[2].keys().next().unwrap().as_str(), "u2");
    }
}
