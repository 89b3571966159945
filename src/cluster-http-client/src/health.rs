//! Adaptive health: a weight modifier family that learns
//! a per-replica health score from observed outcomes.

use std::time::{Duration, Instant};

use crate::response::Verdict;

/// What a tuning policy decides to do with a health value after observing a
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tuning {
    Increase,
    Decrease,
    DontTouch,
}

/// Reduces a list of tuning decisions (one per policy "voter") into one
/// decision: `Decrease` if any voter said `Decrease`, else `Increase` if any
/// said `Increase`, else `DontTouch`.
pub fn compose_tuning(votes: impl IntoIterator<Item = Tuning>) -> Tuning {
    let mut any_increase = false;
    for vote in votes {
        match vote {
            Tuning::Decrease => return Tuning::Decrease,
            Tuning::Increase => any_increase = true,
            Tuning::DontTouch => {}
        }
    }
    if any_increase {
        Tuning::Increase
    } else {
        Tuning::DontTouch
    }
}

/// A tuning policy maps a completed attempt's verdict to a [`Tuning`]
/// decision.
pub trait TuningPolicy: Send + Sync {
    fn tune(&self, verdict: Verdict) -> Tuning;
}

/// The default per-criterion tuning policy: Accept -> Increase, Reject ->
/// Decrease, DontKnow -> DontTouch.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerCriterionPolicy;

impl TuningPolicy for PerCriterionPolicy {
    fn tune(&self, verdict: Verdict) -> Tuning {
        match verdict {
            Verdict::Accept => Tuning::Increase,
            Verdict::Reject => Tuning::Decrease,
            Verdict::DontKnow => Tuning::DontTouch,
        }
    }
}

/// Tuning bounds shared by every [`HealthImpl`].
#[derive(Debug, Clone, Copy)]
pub struct HealthParams {
    /// Multiplier applied on `increase`, must be `> 1.0`.
    pub up: f64,
    /// Multiplier applied on `decrease`, must be in `(0.0, 1.0)`.
    pub down: f64,
    /// Lower bound a health value may never go below, in `(0.0, 1.0)`.
    pub floor: f64,
    /// Time it takes for a decreased health value to linearly recover back
    /// to 1, used only by [`HealthWithDecay`].
    pub decay_duration: Duration,
}

impl Default for HealthParams {
    fn default() -> Self {
        HealthParams {
            up: 1.5,
            down: 0.5,
            floor: 0.1,
            decay_duration: Duration::from_secs(600),
        }
    }
}

/// A scalar health value in `[floor, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthValue(f64);

impl HealthValue {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn create_default() -> Self {
        HealthValue(1.0)
    }

    /// Reconstructs a value previously read out of storage via
    /// [`HealthValue::value`]. Not exposed outside the crate: external
    /// callers must go through `create_default`/`increase`/`decrease` so the
    /// clamping invariants can never be bypassed.
    pub(crate) fn from_raw(value: f64) -> Self {
        HealthValue(value)
    }

    pub fn increase(self, params: &HealthParams) -> Self {
        HealthValue((self.0 * params.up).min(1.0))
    }

    pub fn decrease(self, params: &HealthParams) -> Self {
        HealthValue((self.0 * params.down).max(params.floor))
    }

    /// `apply(weight) = weight * value`.
    pub fn apply(self, weight: f64) -> f64 {
        weight * self.0
    }
}

/// A health value with a decay pivot: the value decreased to `value` at
/// `pivot`, and linearly recovers to `1` over `decay_duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthWithDecay {
    value: f64,
    pivot: Instant,
}

impl HealthWithDecay {
    pub fn value(self) -> f64 {
        self.value
    }

    pub fn pivot(self) -> Instant {
        self.pivot
    }

    pub fn create_default() -> Self {
        HealthWithDecay {
            value: 1.0,
            pivot: Instant::now(),
        }
    }

    /// Reconstructs a value previously read out of storage.
    pub(crate) fn from_parts(value: f64, pivot: Instant) -> Self {
        HealthWithDecay { value, pivot }
    }

    /// Pivot is left unchanged: an increase does not restart the decay
    /// clock, it just raises the floor the decay recovers from.
    pub fn increase(self, params: &HealthParams) -> Self {
        HealthWithDecay {
            value: (self.value * params.up).min(1.0),
            pivot: self.pivot,
        }
    }

    /// A decrease resets the pivot to now, starting a fresh recovery
    /// window.
    pub fn decrease(self, params: &HealthParams) -> Self {
        HealthWithDecay {
            value: (self.value * params.down).max(params.floor),
            pivot: Instant::now(),
        }
    }

    /// `apply` computes the effective health at `now`: `value + damage * t`
    /// where `damage = 1 - value` and `t` is the elapsed fraction of
    /// `decay_duration` since `pivot`, clamped to `[0, 1]`. Once `t >= 1`
    /// the modifier is a no-op (effective health is exactly 1).
    pub fn apply_at(self, weight: f64, now: Instant, params: &HealthParams) -> f64 {
        if params.decay_duration.is_zero() {
            return weight * 1.0_f64.min(self.value.max(1.0));
        }
        let elapsed = now.saturating_duration_since(self.pivot);
        let t = (elapsed.as_secs_f64() / params.decay_duration.as_secs_f64()).clamp(0.0, 1.0);
        let damage = 1.0 - self.value;
        let effective = self.value + damage * t;
        weight * effective
    }

    pub fn apply(self, weight: f64, params: &HealthParams) -> f64 {
        self.apply_at(weight, Instant::now(), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scalar_default_is_one() {
        assert_eq!(HealthValue::create_default().value(), 1.0);
    }

    #[test]
    fn scalar_clamps_to_bounds() {
        let params = HealthParams::default();
        let mut v = HealthValue::create_default();
        for _ in 0..100 {
            v = v.decrease(&params);
        }
        assert!(v.value() >= params.floor);
        for _ in 0..100 {
            v = v.increase(&params);
        }
        assert!(v.value() <= 1.0);
    }

    #[test]
    fn scalar_round_trip_without_clamping() {
        let params = HealthParams {
            up: 2.0,
            down: 0.5,
            floor: 0.01,
            ..HealthParams::default()
        };
        let start = HealthValue(0.4);
        let round_tripped = start.decrease(&params).increase(&params);
        assert!((round_tripped.value() - start.value()).abs() < 1e-9);
    }

    #[test]
    fn composite_tuning_truth_table() {
        assert_eq!(
            compose_tuning([Tuning::Increase, Tuning::Decrease]),
            Tuning::Decrease
        );
        assert_eq!(
            compose_tuning([Tuning::DontTouch, Tuning::Increase]),
            Tuning::Increase
        );
        assert_eq!(
            compose_tuning([Tuning::DontTouch, Tuning::DontTouch]),
            Tuning::DontTouch
        );
        assert_eq!(compose_tuning([]), Tuning::DontTouch);
    }

    #[test]
    fn decay_monotone_in_time_and_reaches_one_at_pivot_plus_duration() {
        let params = HealthParams {
            decay_duration: Duration::from_secs(600),
            down: 0.5,
            up: 1.5,
            floor: 0.1,
        };
        let h = HealthWithDecay {
            value: 0.5,
            pivot: Instant::now(),
        };
        let w0 = h.apply_at(2.0, h.pivot(), &params);
        let w5 = h.apply_at(2.0, h.pivot() + Duration::from_secs(300), &params);
        let w10 = h.apply_at(2.0, h.pivot() + Duration::from_secs(600), &params);
        let w_past = h.apply_at(2.0, h.pivot() + Duration::from_secs(1200), &params);
        assert!(w0 <= w5 && w5 <= w10);
        assert!((w10 - 2.0).abs() < 1e-9);
        assert!((w_past - 2.0).abs() < 1e-9);
        assert!((w5 - 1.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn scalar_health_always_in_bounds(
            ups in 0usize..50,
            downs in 0usize..50,
            up in 1.01f64..3.0,
            down in 0.01f64..0.99,
            floor in 0.01f64..0.5,
        ) {
            let params = HealthParams { up, down, floor, ..HealthParams::default() };
            let mut v = HealthValue::create_default();
            for _ in 0..ups {
                v = v.increase(&params);
            }
            for _ in 0..downs {
                v = v.decrease(&params);
            }
            prop_assert!(v.value() >= params.floor - 1e-9);
            prop_assert!(v.value() <= 1.0 + 1e-9);
        }
    }
}
