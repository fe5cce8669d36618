mod decision;

use std::time::Duration;

use runbook_core::types::RetrySpec;

pub use decision::{decide_retry, AttemptOutcome, RetryDecision, RetryReason};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Predicate evaluated with `current` bound to the attempt's result.
    pub until: Option<String>,
}

impl RetryPolicy {
    /// A step without a retry directive runs exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
            until: None,
        }
    }
}

impl From<&RetrySpec> for RetryPolicy {
    fn from(spec: &RetrySpec) -> Self {
        Self {
            max_attempts: spec.count.max(1),
            interval: spec.interval,
            until: spec.until.clone(),
        }
    }
}
