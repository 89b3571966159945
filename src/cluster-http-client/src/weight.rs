//! Weight modifiers and the adaptive health modifier
//! family built on top of them.

use std::time::Instant;

use tracing::info;

use crate::config::RequestParameters;
use crate::health::{compose_tuning, HealthParams, HealthValue, HealthWithDecay, Tuning, TuningPolicy};
use crate::replica::Replica;
use crate::request::Request;
use crate::response::{ReplicaResult, Verdict};
use crate::storage::ReplicaStorage;

/// A pluggable function pair that influences replica weight and consumes
/// feedback from completed attempts.
///
/// Modifiers compose by ordered application over a shared weight variable
/// starting at `1.0`; each modifier observes the prior modifier's weight.
/// Setting weight to `0` does not short-circuit later modifiers in the
/// chain — composition order is part of the configuration contract (spec
/// §4.3).
pub trait WeightModifier: Send + Sync {
    /// Reads state and mutates `weight` in place.
    fn modify(
        &self,
        replica: &Replica,
        all_replicas: &[Replica],
        request: &Request,
        parameters: &RequestParameters,
        weight: &mut f64,
    );

    /// Updates modifier-owned state from a completed attempt. Dispatch
    /// across modifiers is ordered per-result (every modifier sees a given
    /// result exactly once, in configuration order); across distinct
    /// results, ordering is unspecified.
    fn learn(&self, result: &ReplicaResult);
}

/// Folds an ordered list of modifiers over a replica, starting from weight
/// `1.0`, then fans `learn` out to each modifier in the same order.
#[derive(Default)]
pub struct WeightModifierChain {
    modifiers: Vec<Box<dyn WeightModifier>>,
}

impl WeightModifierChain {
    pub fn new(modifiers: Vec<Box<dyn WeightModifier>>) -> Self {
        WeightModifierChain { modifiers }
    }

    pub fn weight_for(
        &self,
        replica: &Replica,
        all_replicas: &[Replica],
        request: &Request,
        parameters: &RequestParameters,
    ) -> f64 {
        let mut weight = 1.0;
        for modifier in &self.modifiers {
            modifier.modify(replica, all_replicas, request, parameters, &mut weight);
        }
        weight
    }

    pub fn learn(&self, result: &ReplicaResult) {
        for modifier in &self.modifiers {
            modifier.learn(result);
        }
    }
}

/// Classifies whether a completed result was served by the cluster leader.
pub trait LeaderResultDetector: Send + Sync {
    fn is_leader_result(&self, result: &ReplicaResult) -> bool;
}

/// Every replica starts assumed non-leader (weight forced to `0`); once a
/// result is observed that [`LeaderResultDetector`] classifies as
/// leader-served, that replica transitions to leader and its weight passes
/// through unchanged. Transitions are logged.
pub struct LeadershipModifier<D> {
    detector: D,
    leaders: ReplicaStorage<bool>,
}

impl<D: LeaderResultDetector> LeadershipModifier<D> {
    pub fn new(detector: D) -> Self {
        LeadershipModifier {
            detector,
            leaders: ReplicaStorage::new(),
        }
    }
}

impl<D: LeaderResultDetector + Send + Sync> WeightModifier for LeadershipModifier<D> {
    fn modify(
        &self,
        replica: &Replica,
        _all_replicas: &[Replica],
        _request: &Request,
        _parameters: &RequestParameters,
        weight: &mut f64,
    ) {
        let is_leader = self.leaders.get(replica).unwrap_or(false);
        if !is_leader {
            *weight = 0.0;
        }
    }

    fn learn(&self, result: &ReplicaResult) {
        let observed_leader = self.detector.is_leader_result(result);
        let previous = self.leaders.get(&result.replica).unwrap_or(false);
        if observed_leader != previous {
            info!(
                replica = %result.replica,
                from = previous,
                to = observed_leader,
                "replica leadership state transition"
            );
        }
        if self.leaders.try_add(&result.replica, observed_leader) {
            return;
        }
        // Already present: retry the CAS until it lands or becomes a no-op.
        loop {
            let current = self.leaders.get(&result.replica).unwrap_or(false);
            if current == observed_leader {
                return;
            }
            if self
                .leaders
                .try_update(&result.replica, observed_leader, |v| *v == current)
            {
                return;
            }
        }
    }
}

/// Which [`HealthParams`]-based implementation an [`AdaptiveHealthModifier`]
/// uses.
enum HealthImplKind {
    Scalar,
    WithDecay,
}

enum HealthState {
    Scalar(HealthValue),
    WithDecay(HealthWithDecay),
}

/// A weight modifier parameterized by an implementation (scalar vs.
/// with-decay) and a [`TuningPolicy`].
pub struct AdaptiveHealthModifier<P> {
    kind: HealthImplKind,
    params: HealthParams,
    policy: P,
    scalar: ReplicaStorage<f64>,
    decayed: ReplicaStorage<(f64, Instant)>,
}

impl<P: TuningPolicy> AdaptiveHealthModifier<P> {
    pub fn scalar(params: HealthParams, policy: P) -> Self {
        AdaptiveHealthModifier {
            kind: HealthImplKind::Scalar,
            params,
            policy,
            scalar: ReplicaStorage::new(),
            decayed: ReplicaStorage::new(),
        }
    }

    pub fn with_decay(params: HealthParams, policy: P) -> Self {
        AdaptiveHealthModifier {
            kind: HealthImplKind::WithDecay,
            params,
            policy,
            scalar: ReplicaStorage::new(),
            decayed: ReplicaStorage::new(),
        }
    }

    fn read(&self, replica: &Replica) -> HealthState {
        match self.kind {
            HealthImplKind::Scalar => HealthState::Scalar(scalar_or_default(
                self.scalar.get(replica),
            )),
            HealthImplKind::WithDecay => {
                let (value, pivot) = self
                    .decayed
                    .get(replica)
                    .unwrap_or_else(|| (1.0, Instant::now()));
                HealthState::WithDecay(HealthWithDecay::from_parts(value, pivot))
            }
        }
    }
}

fn scalar_or_default(stored: Option<f64>) -> HealthValue {
    match stored {
        Some(v) => HealthValue::from_raw(v),
        None => HealthValue::create_default(),
    }
}

impl<P: TuningPolicy + Send + Sync> WeightModifier for AdaptiveHealthModifier<P> {
    fn modify(
        &self,
        replica: &Replica,
        _all_replicas: &[Replica],
        _request: &Request,
        _parameters: &RequestParameters,
        weight: &mut f64,
    ) {
        match self.read(replica) {
            HealthState::Scalar(v) => *weight = v.apply(*weight),
            HealthState::WithDecay(v) => *weight = v.apply(*weight, &self.params),
        }
    }

    fn learn(&self, result: &ReplicaResult) {
        let tuning = self.policy.tune(result.verdict);
        if matches!(tuning, Tuning::DontTouch) {
            return;
        }
        loop {
            match self.kind {
                HealthImplKind::Scalar => {
                    let current = scalar_or_default(self.scalar.get(&result.replica));
                    let next = match tuning {
                        Tuning::Increase => current.increase(&self.params),
                        Tuning::Decrease => current.decrease(&self.params),
                        Tuning::DontTouch => return,
                    };
                    if self.scalar.try_add(&result.replica, next.value()) {
                        return;
                    }
                    let before = current.value();
                    if self
                        .scalar
                        .try_update(&result.replica, next.value(), |v| *v == before)
                    {
                        return;
                    }
                    // Contention: retry with a fresh read.
                }
                HealthImplKind::WithDecay => {
                    let (value, pivot) = self
                        .decayed
                        .get(&result.replica)
                        .unwrap_or_else(|| (1.0, Instant::now()));
                    let current = HealthWithDecay::from_parts(value, pivot);
                    let next = match tuning {
                        Tuning::Increase => current.increase(&self.params),
                        Tuning::Decrease => current.decrease(&self.params),
                        Tuning::DontTouch => return,
                    };
                    let next_pair = (next.value(), next.pivot());
                    if self.decayed.try_add(&result.replica, next_pair) {
                        return;
                    }
                    if self
                        .decayed
                        .try_update(&result.replica, next_pair, |v| *v == (value, pivot))
                    {
                        return;
                    }
                    // Contention: retry with a fresh read.
                }
            }
        }
    }
}
