use std::time::Duration;

use super::RetryPolicy;

/// How one attempt ended, from the retry loop's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The runner succeeded and the predicate (if any) held.
    Satisfied,
    /// The runner succeeded but the predicate was falsy.
    Unsatisfied,
    /// The runner failed with a retryable error.
    Failed,
    /// The attempt failed in a way no retry can fix.
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, reason: RetryReason },
    Stop { reason: RetryReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Satisfied,
    NotRetryable,
    AttemptsExhausted,
    PredicateFalse,
    RunnerFailure,
}

/// Decide whether another attempt follows `attempt_no` (1-based) and after how long.
pub fn decide_retry(policy: &RetryPolicy, attempt_no: u32, outcome: AttemptOutcome) -> RetryDecision {
    let reason = match outcome {
        AttemptOutcome::Satisfied => {
            return RetryDecision::Stop {
                reason: RetryReason::Satisfied,
            }
        }
        AttemptOutcome::Fatal => {
            return RetryDecision::Stop {
                reason: RetryReason::NotRetryable,
            }
        }
        AttemptOutcome::Unsatisfied => RetryReason::PredicateFalse,
        AttemptOutcome::Failed => RetryReason::RunnerFailure,
    };

    if attempt_no >= policy.max_attempts {
        return RetryDecision::Stop {
            reason: RetryReason::AttemptsExhausted,
        };
    }

    RetryDecision::RetryAfter {
        delay: policy.interval,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max,
            interval: Duration::from_millis(10),
            until: Some("current.ok".into()),
        }
    }

    #[test]
    fn stops_when_satisfied() {
        assert_eq!(
            decide_retry(&policy(3), 1, AttemptOutcome::Satisfied),
            RetryDecision::Stop {
                reason: RetryReason::Satisfied
            }
        );
    }

    #[test]
    fn retries_until_exhausted() {
        let p = policy(3);
        assert!(matches!(
            decide_retry(&p, 2, AttemptOutcome::Unsatisfied),
            RetryDecision::RetryAfter { reason: RetryReason::PredicateFalse, .. }
        ));
        assert_eq!(
            decide_retry(&p, 3, AttemptOutcome::Failed),
            RetryDecision::Stop {
                reason: RetryReason::AttemptsExhausted
            }
        );
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        assert_eq!(
            decide_retry(&RetryPolicy::once(), 1, AttemptOutcome::Failed),
            RetryDecision::Stop {
                reason: RetryReason::AttemptsExhausted
            }
        );
    }
}
