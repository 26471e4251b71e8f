//! Scripted in-memory batch transport for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use batch_orchestrator::batch::BatchEnvelope;
use batch_orchestrator::transport::{
    BatchResponse, BatchTransport, ItemResponse, TransportError, TransportReply,
};
use batch_orchestrator::RequestUnit;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn units(n: usize) -> Vec<RequestUnit> {
    (0..n)
        .map(|i| RequestUnit::get(format!("unit-{i:03}"), format!("/resources/{i}")))
        .collect()
}

/// Answers each unit from a per-key status script, falling back to a default
/// status once the script runs out.
pub struct ScriptedTransport {
    default_status: u16,
    scripts: Mutex<HashMap<String, VecDeque<u16>>>,
    batch_errors: Mutex<VecDeque<TransportError>>,
    reject_above: Option<usize>,
    latency: Duration,
    deferred: bool,
    pending: Mutex<HashMap<String, BatchResponse>>,
    sends: AtomicUsize,
    polls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    accepted_sizes: Mutex<Vec<usize>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            default_status: 200,
            scripts: Mutex::new(HashMap::new()),
            batch_errors: Mutex::new(VecDeque::new()),
            reject_above: None,
            latency: Duration::ZERO,
            deferred: false,
            pending: Mutex::new(HashMap::new()),
            sends: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            accepted_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_status(mut self, status: u16) -> Self {
        self.default_status = status;
        self
    }

    /// Statuses returned for `key` on successive attempts.
    pub fn with_script(self, key: &str, statuses: &[u16]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), statuses.iter().copied().collect());
        self
    }

    pub fn with_script_for_all(self, units: &[RequestUnit], statuses: &[u16]) -> Self {
        units
            .iter()
            .fold(self, |t, u| t.with_script(u.key.as_str(), statuses))
    }

    /// Fail the next sends as a whole, in order.
    pub fn with_batch_error(self, err: TransportError) -> Self {
        self.batch_errors.lock().unwrap().push_back(err);
        self
    }

    /// Reject envelopes larger than `n` with HTTP 413.
    pub fn rejecting_above(mut self, n: usize) -> Self {
        self.reject_above = Some(n);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer every send with 202 and deliver the result on the first poll.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn accepted_sizes(&self) -> Vec<usize> {
        self.accepted_sizes.lock().unwrap().clone()
    }

    fn reply_for(&self, envelope: &BatchEnvelope) -> Result<TransportReply, TransportError> {
        if let Some(err) = self.batch_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(limit) = self.reject_above {
            if envelope.len() > limit {
                return Err(TransportError::PayloadRejected {
                    status: 413,
                    body: "request entity too large".into(),
                });
            }
        }
        self.accepted_sizes.lock().unwrap().push(envelope.len());

        let mut scripts = self.scripts.lock().unwrap();
        let items = envelope
            .keys()
            .map(|k| {
                let status = scripts
                    .get_mut(k.as_str())
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(self.default_status);
                let item = ItemResponse::new(k.as_str(), status);
                if (200..300).contains(&status) {
                    item.with_content(serde_json::json!({ "name": k.as_str() }))
                } else {
                    item
                }
            })
            .collect();
        let response = BatchResponse::new(items);

        if self.deferred {
            let location = format!("/operations/{}", envelope.id);
            self.pending
                .lock()
                .unwrap()
                .insert(location.clone(), response);
            return Ok(TransportReply::Deferred {
                location,
                retry_after: None,
            });
        }
        Ok(TransportReply::Completed(response))
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<TransportReply, TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self.reply_for(envelope);
        self.current.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    async fn poll(&self, location: &str) -> Result<TransportReply, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.pending.lock().unwrap().remove(location) {
            Some(response) => Ok(TransportReply::Completed(response)),
            None => Err(TransportError::Malformed(format!("unknown location {location}"))),
        }
    }
}
