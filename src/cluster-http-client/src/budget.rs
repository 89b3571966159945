//! Monotonic per-request time budgets.

use std::time::Duration;

use tokio::time::Instant;

/// A wall-clock duration budget for a single logical request.
///
/// Backed by [`tokio::time::Instant`], which is monotonic on every platform
/// Rust's standard library targets and, outside of a paused test runtime,
/// behaves identically to [`std::time::Instant`]; wall-clock (`SystemTime`)
/// is never used here, since a clock adjustment mid-request must not
/// perturb the budget. Using tokio's `Instant` rather than `std`'s directly
/// is what lets a budget-exhaustion scenario be driven deterministically
/// under `tokio::time::pause()` in tests, instead of actually sleeping.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    total: Duration,
    start: Instant,
}

impl TimeBudget {
    /// Starts a new budget of `total` duration, beginning now.
    pub fn new(total: Duration) -> Self {
        TimeBudget {
            total,
            start: Instant::now(),
        }
    }

    /// The total duration this budget was created with.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Time elapsed since the budget was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left in the budget, clamped to zero (never negative).
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// Whether the budget has been fully consumed.
    pub fn has_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_clamps_to_zero() {
        let budget = TimeBudget::new(Duration::from_millis(0));
        assert!(budget.has_expired());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn remaining_is_non_increasing() {
        let budget = TimeBudget::new(Duration::from_millis(50));
        let first = budget.remaining();
        std::thread::sleep(Duration::from_millis(5));
        let second = budget.remaining();
        assert!(second <= first);
    }

    #[test]
    fn fresh_budget_has_full_remaining() {
        let budget = TimeBudget::new(Duration::from_secs(10));
        assert!(budget.remaining() <= budget.total());
        assert!(!budget.has_expired());
    }
}
