//! 重试协调模块：逐单元的状态机、指数退避与抖动。
//!
//! # Retry Coordination Module
//!
//! Decides, for every per-unit attempt result, whether the unit is done, should
//! be retried after a delay, or has failed for good.
//!
//! ## State machine
//!
//! ```text
//! Pending -> InFlight -> Succeeded
//!                     -> Throttled        -> Pending (after delay)
//!                     -> TransportFailed  -> Pending (after delay)
//!                     -> PermanentlyFailed
//! ```
//!
//! `Succeeded`, `PermanentlyFailed` and `Cancelled` are terminal.
//!
//! ## Status classification
//!
//! | Item status | Attempt outcome |
//! |-------------|-----------------|
//! | 2xx | `Success` |
//! | 429 | `Throttled` (honours `Retry-After`) |
//! | 400, 401, 403, 404, 409 | `PermanentFailure`, or `Throttled` when a `Retry-After` is present |
//! | 408, 5xx | `TransportFailure` |
//! | other | `PermanentFailure` |

mod coordinator;
mod policy;

pub use coordinator::{AttemptRecord, Decision, RetryCoordinator, UnitState};
pub use policy::{classify, RetryPolicy};
