use super::DispatchResult;
use crate::batch::BatchEnvelope;
use crate::retry::classify;
use crate::transport::{ItemResponse, TransportError};
use crate::types::{Outcome, RequestUnit};
use std::collections::HashMap;

/// Pair every unit of a finished envelope with its attempt outcome.
///
/// Items are matched by name first and by position when the response carries
/// no names. A whole-call failure is applied to every unit: a batch-level 429
/// becomes `Throttled`, anything else `TransportFailure`. Partial success is
/// never assumed for a failed call.
pub fn settle_envelope(envelope: BatchEnvelope, result: DispatchResult) -> Vec<(RequestUnit, Outcome)> {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let outcome = batch_failure_outcome(&err);
            return envelope
                .units
                .into_iter()
                .map(|u| (u, outcome.clone()))
                .collect();
        }
    };

    let mut by_name: HashMap<String, ItemResponse> = HashMap::new();
    let mut unnamed: Vec<Option<ItemResponse>> = Vec::new();
    for item in response.items {
        match item.name.clone() {
            Some(name) if !name.is_empty() => {
                by_name.insert(name, item);
            }
            _ => unnamed.push(Some(item)),
        }
    }
    let positional = by_name.is_empty();

    envelope
        .units
        .into_iter()
        .enumerate()
        .map(|(i, unit)| {
            let item = if positional {
                unnamed.get_mut(i).and_then(Option::take)
            } else {
                by_name.remove(unit.key.as_str())
            };
            let outcome = match item {
                Some(item) => classify(&item),
                None => Outcome::TransportFailure {
                    cause: "unit missing from batch response".into(),
                },
            };
            (unit, outcome)
        })
        .collect()
}

fn batch_failure_outcome(err: &TransportError) -> Outcome {
    match err {
        TransportError::Throttled { retry_after } => Outcome::Throttled {
            retry_after: *retry_after,
        },
        other => Outcome::TransportFailure {
            cause: other.to_string(),
        },
    }
}
