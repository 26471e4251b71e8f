//! # batch-orchestrator
//!
//! 面向远程批量 API 的请求编排器：分批、并发派发、按单元重试，并汇总每个请求的最终结果。
//!
//! Resilient orchestration of many small API requests through a remote batch
//! endpoint. Units are grouped into size-limited envelopes, dispatched under a
//! concurrency limit, retried individually on throttling or transport failures,
//! and reconciled into one terminal outcome per unit.
//!
//! ## Overview
//!
//! A caller hands [`Orchestrator::submit`] a list of [`RequestUnit`]s, each with
//! a unique [`CorrelationKey`]. The run ends when every unit has reached a
//! terminal [`Outcome`] (success, permanent failure or cancellation), or when the
//! optional deadline passes. Per-unit failures never fail the run; they are
//! reported in the [`RunReport`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_orchestrator::{
//!     CachedTokenProvider, EnvTokenProvider, HttpBatchTransport, Orchestrator, RequestUnit,
//!     RunOptions,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> batch_orchestrator::Result<()> {
//!     let tokens = CachedTokenProvider::new(EnvTokenProvider::default(), Duration::from_secs(300));
//!     let transport = HttpBatchTransport::new("https://management.azure.com", Arc::new(tokens))?;
//!
//!     let options = RunOptions::default()
//!         .with_max_batch_size(20)
//!         .with_concurrency_limit(4);
//!     let orchestrator = Orchestrator::new(Arc::new(transport)).with_options(options);
//!
//!     let units = vec![
//!         RequestUnit::get("vm-a", "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/a"),
//!         RequestUnit::get("vm-b", "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/b"),
//!     ];
//!     let report = orchestrator.submit(units).await?;
//!     for (key, result) in report.iter() {
//!         println!("{key}: {} after {} attempt(s)", result.outcome.kind(), result.attempts);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Request units, correlation keys and outcomes |
//! | [`batch`] | Partitioning into envelopes and adaptive batch sizing |
//! | [`transport`] | Batch endpoint seam, HTTP implementation, wire format, auth |
//! | [`dispatch`] | Concurrency-limited dispatch and deferred-result polling |
//! | [`retry`] | Outcome classification, backoff policy, per-unit state machine |
//! | [`reconcile`] | Final outcome mapping and run statistics |
//! | [`orchestrator`] | `submit`, background runs, cancellation, options |

pub mod batch;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod transport;
pub mod types;

pub use error::{Error, ErrorContext};
pub use orchestrator::{CancelHandle, Orchestrator, RunHandle, RunOptions};
pub use reconcile::{RunReport, RunStatistics, UnitResult};
pub use retry::RetryPolicy;
pub use transport::{
    BatchTransport, CachedTokenProvider, EnvTokenProvider, HttpBatchTransport, StaticTokenProvider,
    TokenProvider, TransportError,
};
pub use types::{CorrelationKey, HttpMethod, Outcome, RequestUnit};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
