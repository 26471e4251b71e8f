//! Per-unit outcomes

use serde::Serialize;
use std::time::Duration;

/// Result of one attempt for a unit, or its terminal result once the run settles.
///
/// `Success`, `PermanentFailure` and `Cancelled` are terminal. `Throttled` and
/// `TransportFailure` only appear as intermediate attempt results; the retry
/// coordinator either schedules another attempt or converts them to
/// `PermanentFailure` once the attempt budget is spent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        status: u16,
        content: Option<serde_json::Value>,
    },
    Throttled {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<Duration>,
    },
    TransportFailure {
        cause: String,
    },
    PermanentFailure {
        status: Option<u16>,
        content: Option<serde_json::Value>,
    },
    Cancelled,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Outcome::Success { .. } | Outcome::PermanentFailure { .. } | Outcome::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Outcome::Success { status, .. } => Some(*status),
            Outcome::PermanentFailure { status, .. } => *status,
            Outcome::Throttled { .. } => Some(429),
            _ => None,
        }
    }

    /// Short label for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Throttled { .. } => "throttled",
            Outcome::TransportFailure { .. } => "transport_failure",
            Outcome::PermanentFailure { .. } => "permanent_failure",
            Outcome::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_variants() {
        assert!(Outcome::Success { status: 200, content: None }.is_terminal());
        assert!(Outcome::PermanentFailure { status: Some(404), content: None }.is_terminal());
        assert!(Outcome::Cancelled.is_terminal());
        assert!(!Outcome::Throttled { retry_after: None }.is_terminal());
        assert!(!Outcome::TransportFailure { cause: "reset".into() }.is_terminal());
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let v = serde_json::to_value(Outcome::Success {
            status: 200,
            content: Some(serde_json::json!({"value": []})),
        })
        .unwrap();
        assert_eq!(v["kind"], "success");
        assert_eq!(v["status"], 200);
        assert_eq!(serde_json::to_value(Outcome::Cancelled).unwrap()["kind"], "cancelled");
    }
}
