//! 类型系统模块：定义批处理编排的核心数据类型。
//!
//! # Types Module
//!
//! Value types shared by every stage of an orchestration run.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestUnit`] | One logical management-plane request, identified by a correlation key |
//! | [`CorrelationKey`] | Caller-unique key used to reconcile results across batches and attempts |
//! | [`HttpMethod`] | HTTP verb of a request unit |
//! | [`Outcome`] | Result of one attempt, or the terminal result of a unit |
//!
//! ## Example
//!
//! ```rust
//! use batch_orchestrator::types::{HttpMethod, RequestUnit};
//!
//! let unit = RequestUnit::new("sub-01", HttpMethod::Post, "/subscriptions/01/providers/Microsoft.CostManagement/query")
//!     .with_body(serde_json::json!({"type": "ActualCost"}));
//! assert_eq!(unit.key.as_str(), "sub-01");
//! ```

pub mod outcome;
pub mod request;

pub use outcome::Outcome;
pub use request::{CorrelationKey, HttpMethod, RequestUnit};
