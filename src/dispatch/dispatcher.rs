use crate::batch::BatchEnvelope;
use crate::transport::{BatchResponse, BatchTransport, TransportError, TransportReply};
use crate::{Error, ErrorContext, Result};
use futures::Stream;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Outcome of one physical call: a batch response or a whole-envelope failure.
pub type DispatchResult = std::result::Result<BatchResponse, TransportError>;

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub concurrency_limit: usize,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(60),
        }
    }
}

/// Bounded pool of in-flight batch calls.
pub struct Dispatcher {
    transport: Arc<dyn BatchTransport>,
    config: DispatchConfig,
    queue: VecDeque<BatchEnvelope>,
    in_flight: JoinSet<DispatchResult>,
    /// Envelope behind each running task, so a task that dies still settles its units.
    envelopes: HashMap<Id, BatchEnvelope>,
    peak_in_flight: usize,
    started: u64,
    halt: Option<CancellationToken>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn BatchTransport>, config: DispatchConfig) -> Result<Self> {
        if config.concurrency_limit == 0 {
            return Err(Error::configuration_with_context(
                "concurrency_limit must be >= 1",
                ErrorContext::new()
                    .with_field_path("options.concurrency_limit")
                    .with_details("got 0")
                    .with_source("dispatcher"),
            ));
        }
        if config.poll_timeout < config.poll_interval {
            return Err(Error::configuration_with_context(
                "poll_timeout must not be smaller than poll_interval",
                ErrorContext::new()
                    .with_field_path("options.poll_timeout_ms")
                    .with_details(format!(
                        "interval {:?}, timeout {:?}",
                        config.poll_interval, config.poll_timeout
                    ))
                    .with_source("dispatcher"),
            ));
        }
        Ok(Self {
            transport,
            config,
            queue: VecDeque::new(),
            in_flight: JoinSet::new(),
            envelopes: HashMap::new(),
            peak_in_flight: 0,
            started: 0,
            halt: None,
        })
    }

    /// Stop starting new envelopes once `token` is cancelled. Calls already
    /// running are left to finish.
    pub fn with_halt(mut self, token: CancellationToken) -> Self {
        self.halt = Some(token);
        self
    }

    pub fn enqueue(&mut self, envelope: BatchEnvelope) {
        self.queue.push_back(envelope);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    /// Envelopes handed to the transport so far.
    pub fn envelopes_started(&self) -> u64 {
        self.started
    }

    /// Remove envelopes that have not started yet.
    pub fn drain_queue(&mut self) -> Vec<BatchEnvelope> {
        self.queue.drain(..).collect()
    }

    /// Start queued envelopes until the concurrency limit is reached.
    /// Must be called from within a tokio runtime.
    pub fn fill(&mut self) -> usize {
        let mut spawned = 0;
        if self.halt.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return spawned;
        }
        while self.in_flight.len() < self.config.concurrency_limit {
            let Some(envelope) = self.queue.pop_front() else {
                break;
            };
            let transport = Arc::clone(&self.transport);
            let config = self.config;
            debug!(envelope_id = %envelope.id, size = envelope.len(), "dispatching envelope");
            let task_envelope = envelope.clone();
            let handle = self.in_flight.spawn(async move {
                dispatch_one(transport.as_ref(), &task_envelope, config).await
            });
            self.envelopes.insert(handle.id(), envelope);
            self.started += 1;
            spawned += 1;
            self.peak_in_flight = self.peak_in_flight.max(self.in_flight.len());
        }
        spawned
    }

    /// Wait for the next call to finish, then refill free slots from the queue.
    ///
    /// Returns `None` once nothing is in flight.
    pub async fn next_completed(&mut self) -> Option<(BatchEnvelope, DispatchResult)> {
        loop {
            let (id, result) = match self.in_flight.join_next_with_id().await? {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    error!(error = %e, panicked = e.is_panic(), "dispatch task failed");
                    let cause = if e.is_panic() {
                        "transport call panicked".to_string()
                    } else {
                        format!("dispatch task failed: {e}")
                    };
                    (e.id(), Err(TransportError::Network(cause)))
                }
            };
            self.fill();
            match self.envelopes.remove(&id) {
                Some(envelope) => return Some((envelope, result)),
                None => error!(task_id = %id, "completed task has no envelope"),
            }
        }
    }

    /// Dispatch `envelopes` and yield each `(envelope, result)` as it completes.
    ///
    /// Completion order is not submission order.
    pub fn run(
        mut self,
        envelopes: Vec<BatchEnvelope>,
    ) -> impl Stream<Item = (BatchEnvelope, DispatchResult)> + Send {
        for envelope in envelopes {
            self.enqueue(envelope);
        }
        futures::stream::unfold(self, |mut dispatcher| async move {
            dispatcher.fill();
            let done = dispatcher.next_completed().await?;
            Some((done, dispatcher))
        })
    }
}

async fn dispatch_one(
    transport: &dyn BatchTransport,
    envelope: &BatchEnvelope,
    config: DispatchConfig,
) -> DispatchResult {
    let mut reply = transport.send(envelope).await?;
    let polling_since = Instant::now();
    loop {
        match reply {
            TransportReply::Completed(response) => return Ok(response),
            TransportReply::Deferred { location, .. } => {
                let elapsed = polling_since.elapsed();
                if elapsed + config.poll_interval > config.poll_timeout {
                    return Err(TransportError::PollTimeout(config.poll_timeout));
                }
                tokio::time::sleep(config.poll_interval).await;
                let remaining = config.poll_timeout.saturating_sub(polling_since.elapsed());
                debug!(envelope_id = %envelope.id, location = location.as_str(), "polling deferred batch result");
                reply = match tokio::time::timeout(remaining, transport.poll(&location)).await {
                    Ok(r) => r?,
                    Err(_) => return Err(TransportError::PollTimeout(config.poll_timeout)),
                };
            }
        }
    }
}
