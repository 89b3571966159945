//! Retry driver: a policy deciding whether the
//! execution stage should be restarted, and the pipeline module (part of
//! C9) that applies it.

use crate::result::{ClusterResult, ClusterResultStatus};

/// Decides whether to restart the executor stage after observing one
/// attempt's terminal result (spec §4.9 `Retry`).
pub trait RetryPolicy: Send + Sync {
    /// `attempt_index` is `0` for the first call (which always happens
    /// outside any retry); a policy returning `true` causes one more call.
    fn should_retry(&self, attempt_index: u32, result: &ClusterResult) -> bool;
}

/// Never retries. The default when a client registers no retry policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _attempt_index: u32, _result: &ClusterResult) -> bool {
        false
    }
}

/// Retries up to `max_attempts` additional times, but only for statuses that
/// plausibly benefit from a fresh execution pass: `ReplicasExhausted` (every
/// replica rejected; maybe a transient cluster-wide blip) or
/// `UnexpectedException`. `Success`, `Canceled`, `TimeExpired`,
/// `IncorrectArguments`, and `ReplicasNotFound` are never worth retrying —
/// the budget is spent, the input was bad, or there's nothing to retry
/// against.
#[derive(Debug, Clone, Copy)]
pub struct MaxAttemptsRetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy for MaxAttemptsRetryPolicy {
    fn should_retry(&self, attempt_index: u32, result: &ClusterResult) -> bool {
        if attempt_index >= self.max_attempts {
            return false;
        }
        matches!(
            result.status,
            ClusterResultStatus::ReplicasExhausted | ClusterResultStatus::UnexpectedException
        )
    }
}
