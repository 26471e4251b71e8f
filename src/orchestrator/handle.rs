use crate::reconcile::{ResultReconciler, RunReport};
use crate::{Error, ErrorContext, Result};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle for cancelling a run from outside.
///
/// In-flight calls are allowed to finish; nothing new is dispatched and every
/// unsettled unit ends as `Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

pub(crate) type SharedReconciler = Arc<Mutex<ResultReconciler>>;

/// A run started in the background.
pub struct RunHandle {
    reconciler: SharedReconciler,
    cancel: CancelHandle,
    task: JoinHandle<Result<RunReport>>,
}

impl RunHandle {
    pub(crate) fn new(
        reconciler: SharedReconciler,
        cancel: CancelHandle,
        task: JoinHandle<Result<RunReport>>,
    ) -> Self {
        Self {
            reconciler,
            cancel,
            task,
        }
    }

    /// Progress so far: settled units and counters.
    pub fn snapshot(&self) -> RunReport {
        self.reconciler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to settle and return the full report.
    pub async fn wait(self) -> Result<RunReport> {
        match self.task.await {
            Ok(report) => report,
            Err(e) => Err(Error::runtime_with_context(
                format!("run task failed: {}", e),
                ErrorContext::new().with_source("run_handle"),
            )),
        }
    }
}
