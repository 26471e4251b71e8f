//! 分发模块：在并发上限内提交批次并收集结果。
//!
//! # Dispatch Module
//!
//! The [`Dispatcher`] keeps at most `concurrency_limit` batch calls in flight.
//! As soon as one finishes, the next queued envelope starts, so slow calls
//! never hold back a whole "wave".
//!
//! Deferred results (202 + `Location`) are polled on a fixed interval until
//! the remote answers or `poll_timeout` runs out; a timeout fails the whole
//! envelope. [`settle_envelope`] turns a finished call into one
//! [`Outcome`](crate::types::Outcome) per unit.

mod dispatcher;
mod settle;

pub use dispatcher::{DispatchConfig, DispatchResult, Dispatcher};
pub use settle::settle_envelope;
