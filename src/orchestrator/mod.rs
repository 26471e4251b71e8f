//! Orchestrator: the public `submit` surface and the run loop tying batching,
//! dispatch, retry and reconciliation together.
//!
//! 编排器：对外的 `submit` 入口，以及串联分批、派发、重试与结果汇总的运行循环。

mod handle;
mod options;

pub use handle::{CancelHandle, RunHandle};
pub use options::RunOptions;

use crate::batch::{partition, BatchEnvelope, BatchSizer, EnvelopeFeedback};
use crate::dispatch::{settle_envelope, DispatchResult, Dispatcher};
use crate::reconcile::{ResultReconciler, RunReport};
use crate::retry::{Decision, RetryCoordinator};
use crate::transport::BatchTransport;
use crate::types::{CorrelationKey, Outcome, RequestUnit};
use crate::{Error, ErrorContext, Result};
use handle::SharedReconciler;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Entry point for submitting a set of request units.
///
/// ```no_run
/// use batch_orchestrator::{HttpBatchTransport, Orchestrator, RequestUnit, RunOptions, StaticTokenProvider};
/// use std::sync::Arc;
///
/// # async fn demo() -> batch_orchestrator::Result<()> {
/// let transport = HttpBatchTransport::new(
///     "https://management.azure.com",
///     Arc::new(StaticTokenProvider::new("token")),
/// )?;
/// let orchestrator = Orchestrator::new(Arc::new(transport))
///     .with_options(RunOptions::default().with_max_batch_size(15));
/// let units = (0..37)
///     .map(|i| RequestUnit::get(format!("vm-{i}"), format!("/subscriptions/s/vms/vm-{i}")))
///     .collect();
/// let report = orchestrator.submit(units).await?;
/// println!("{} of {} succeeded", report.stats.succeeded, report.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn BatchTransport>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn BatchTransport>) -> Self {
        Self {
            transport,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every unit to a terminal outcome and return the report.
    ///
    /// Per-unit failures never surface as `Err`; only invalid options or
    /// duplicate correlation keys do, and both are rejected before any call.
    pub async fn submit(&self, units: Vec<RequestUnit>) -> Result<RunReport> {
        self.start(units)?.wait().await
    }

    /// Start a run in the background.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, units: Vec<RequestUnit>) -> Result<RunHandle> {
        self.start_with_cancel(units, CancelHandle::new())
    }

    /// Start a run that stops when `cancel` fires.
    pub fn start_with_cancel(&self, units: Vec<RequestUnit>, cancel: CancelHandle) -> Result<RunHandle> {
        self.options.validate()?;
        ensure_unique_keys(&units)?;

        let order: Vec<CorrelationKey> = units.iter().map(|u| u.key.clone()).collect();
        let reconciler: SharedReconciler =
            Arc::new(Mutex::new(ResultReconciler::new(order, self.options.deadline)));

        let stop = cancel.token().child_token();
        let dispatcher = Dispatcher::new(self.transport.clone(), self.options.dispatch_config())?
            .with_halt(stop.clone());

        let run = Run::new(units, &self.options, dispatcher, reconciler.clone(), stop);
        let task = tokio::spawn(run.execute());
        Ok(RunHandle::new(reconciler, cancel, task))
    }
}

fn ensure_unique_keys(units: &[RequestUnit]) -> Result<()> {
    let mut seen = HashSet::with_capacity(units.len());
    for (i, unit) in units.iter().enumerate() {
        if !seen.insert(&unit.key) {
            return Err(Error::configuration_with_context(
                "duplicate correlation key",
                ErrorContext::new()
                    .with_field_path(format!("units[{i}].key"))
                    .with_details(unit.key.to_string())
                    .with_source("orchestrator"),
            ));
        }
    }
    Ok(())
}

fn lock(reconciler: &SharedReconciler) -> MutexGuard<'_, ResultReconciler> {
    reconciler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

/// State owned by one run's background task.
struct Run {
    dispatcher: Dispatcher,
    coordinator: RetryCoordinator,
    sizer: BatchSizer,
    reconciler: SharedReconciler,
    positions: HashMap<CorrelationKey, usize>,
    ready: Vec<RequestUnit>,
    waiting: Vec<(Instant, RequestUnit)>,
    stop: CancellationToken,
    deadline: Option<Instant>,
    started: Instant,
}

impl Run {
    fn new(
        units: Vec<RequestUnit>,
        options: &RunOptions,
        dispatcher: Dispatcher,
        reconciler: SharedReconciler,
        stop: CancellationToken,
    ) -> Self {
        let started = Instant::now();
        let mut coordinator = RetryCoordinator::new(options.retry_policy());
        let mut positions = HashMap::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            coordinator.register(unit.key.clone());
            positions.insert(unit.key.clone(), i);
        }
        Self {
            dispatcher,
            coordinator,
            sizer: BatchSizer::new(options.max_batch_size),
            reconciler,
            positions,
            ready: units,
            waiting: Vec::new(),
            stop,
            deadline: options.deadline.map(|d| started + d),
            started,
        }
    }

    async fn execute(mut self) -> Result<RunReport> {
        info!(
            units = self.ready.len(),
            max_batch_size = self.sizer.current(),
            max_attempts = self.coordinator.policy().max_attempts,
            "orchestration run started"
        );

        loop {
            if self.should_stop() {
                break;
            }
            self.promote_due(Instant::now());
            self.dispatch_ready()?;
            if self.dispatcher.is_idle() && self.waiting.is_empty() {
                break;
            }

            let next_wake = self.waiting.iter().map(|(at, _)| *at).min();
            let deadline = self.deadline;
            let has_in_flight = self.dispatcher.in_flight() > 0;
            tokio::select! {
                _ = self.stop.cancelled() => {}
                _ = sleep_until_opt(deadline), if deadline.is_some() => {}
                done = self.dispatcher.next_completed(), if has_in_flight => {
                    if let Some((envelope, result)) = done {
                        self.settle(envelope, result, true);
                    }
                }
                _ = sleep_until_opt(next_wake), if next_wake.is_some() => {}
            }
        }

        self.shutdown().await;

        let report = lock(&self.reconciler).snapshot();
        let stats = &report.stats;
        info!(
            submitted = stats.submitted,
            succeeded = stats.succeeded,
            permanently_failed = stats.permanently_failed,
            cancelled = stats.cancelled,
            retries = stats.retries,
            envelopes = stats.envelopes_sent,
            batch_size_reductions = stats.batch_size_reductions,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "orchestration run finished"
        );
        Ok(report)
    }

    fn should_stop(&self) -> bool {
        if self.deadline.is_some_and(|d| Instant::now() >= d) && !self.stop.is_cancelled() {
            warn!("run deadline reached, cancelling unsettled units");
            self.stop.cancel();
        }
        self.stop.is_cancelled()
    }

    fn promote_due(&mut self, now: Instant) {
        if self.waiting.is_empty() {
            return;
        }
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiting)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.waiting = later;
        self.ready.extend(due.into_iter().map(|(_, unit)| unit));
    }

    /// Re-batch everything ready at the current size and hand it to the dispatcher.
    fn dispatch_ready(&mut self) -> Result<()> {
        if !self.ready.is_empty() {
            let mut ready = std::mem::take(&mut self.ready);
            let positions = &self.positions;
            ready.sort_by_key(|u| positions.get(&u.key).copied().unwrap_or(usize::MAX));

            for envelope in partition(ready, self.sizer.current())? {
                for key in envelope.keys() {
                    self.coordinator.mark_in_flight(key);
                }
                debug!(envelope_id = %envelope.id, size = envelope.len(), "envelope queued");
                self.dispatcher.enqueue(envelope);
            }
        }
        self.dispatcher.fill();
        Ok(())
    }

    fn settle(&mut self, envelope: BatchEnvelope, result: DispatchResult, allow_retry: bool) {
        let feedback = match &result {
            Err(e) if e.is_payload_rejection() => EnvelopeFeedback::PayloadRejected,
            _ => EnvelopeFeedback::Other,
        };
        let shrunk = self.sizer.observe(feedback);

        match &result {
            Ok(resp) => debug!(
                envelope_id = %envelope.id,
                size = envelope.len(),
                items = resp.items.len(),
                "envelope completed"
            ),
            Err(e) => warn!(
                envelope_id = %envelope.id,
                size = envelope.len(),
                error = %e,
                "batch call failed"
            ),
        }

        let now = Instant::now();
        let settled = settle_envelope(envelope, result);

        let mut rec = lock(&self.reconciler);
        rec.note_envelope();
        rec.set_peak_in_flight(self.dispatcher.peak_in_flight());
        if shrunk {
            rec.set_batch_size_reductions(self.sizer.reductions());
        }

        // Units retried from the same envelope go back out together, at the
        // latest of their individual retry times.
        let mut retries: Vec<RequestUnit> = Vec::new();
        let mut group_not_before: Option<Instant> = None;

        for (unit, outcome) in settled {
            match &outcome {
                Outcome::Throttled { .. } => rec.note_throttled(),
                Outcome::TransportFailure { .. } => rec.note_transport_failure(),
                _ => {}
            }
            let decision = self.coordinator.on_outcome(&unit.key, outcome, now);
            let attempts = decision.attempts();
            match decision {
                Decision::Accept { outcome, .. } | Decision::Fail { outcome, .. } => {
                    rec.record(unit.key, outcome, attempts);
                }
                Decision::Retry { not_before, delay, .. } => {
                    if allow_retry {
                        rec.note_retry();
                        debug!(
                            key = %unit.key,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "retry scheduled"
                        );
                        group_not_before = group_not_before.max(Some(not_before));
                        retries.push(unit);
                    } else {
                        let attempts = self.coordinator.cancel(&unit.key);
                        rec.record(unit.key, Outcome::Cancelled, attempts);
                    }
                }
            }
        }

        if let Some(at) = group_not_before {
            for unit in &retries {
                self.coordinator.reschedule(&unit.key, at);
            }
            self.waiting.extend(retries.into_iter().map(|unit| (at, unit)));
        }
    }

    /// Cancel whatever never reached a terminal outcome, then let in-flight
    /// calls finish so their results still count.
    async fn shutdown(&mut self) {
        let queued: Vec<RequestUnit> = self
            .dispatcher
            .drain_queue()
            .into_iter()
            .flat_map(|e| e.units)
            .collect();
        let idle: Vec<RequestUnit> = self
            .waiting
            .drain(..)
            .map(|(_, unit)| unit)
            .chain(self.ready.drain(..))
            .collect();

        if !queued.is_empty() || !idle.is_empty() || self.dispatcher.in_flight() > 0 {
            info!(
                queued = queued.len(),
                waiting = idle.len(),
                in_flight = self.dispatcher.in_flight(),
                "run stopping before completion"
            );
        }

        {
            let mut rec = lock(&self.reconciler);
            // Queued envelopes were counted as an attempt but never reached the transport.
            for unit in queued {
                let attempts = self.coordinator.cancel(&unit.key).saturating_sub(1);
                rec.record(unit.key, Outcome::Cancelled, attempts);
            }
            for unit in idle {
                let attempts = self.coordinator.cancel(&unit.key);
                rec.record(unit.key, Outcome::Cancelled, attempts);
            }
        }

        while let Some((envelope, result)) = self.dispatcher.next_completed().await {
            self.settle(envelope, result, false);
        }

        let mut rec = lock(&self.reconciler);
        rec.set_peak_in_flight(self.dispatcher.peak_in_flight());
        rec.set_batch_size_reductions(self.sizer.reductions());
    }
}
