//! 请求批处理模块：将请求单元划分为受大小约束的批次信封。
//!
//! # Request Batching Module
//!
//! Splits an ordered sequence of [`RequestUnit`](crate::types::RequestUnit)s into
//! [`BatchEnvelope`]s that respect the remote endpoint's maximum batch size.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`partition`] | Pure, order-preserving split into envelopes of at most `max_batch_size` |
//! | [`BatchEnvelope`] | One physical batch call's worth of units |
//! | [`BatchSizer`] | Current batch size, halved under repeated payload rejection |
//!
//! ## Example
//!
//! ```rust
//! use batch_orchestrator::batch::partition;
//! use batch_orchestrator::types::RequestUnit;
//!
//! let units: Vec<_> = (0..37)
//!     .map(|i| RequestUnit::get(format!("unit-{i}"), format!("/subscriptions/{i}")))
//!     .collect();
//! let envelopes = partition(units, 15).unwrap();
//! let sizes: Vec<_> = envelopes.iter().map(|e| e.len()).collect();
//! assert_eq!(sizes, vec![15, 15, 7]);
//! ```

mod partition;
mod sizer;

pub use partition::{partition, BatchEnvelope};
pub use sizer::{BatchSizer, EnvelopeFeedback};
