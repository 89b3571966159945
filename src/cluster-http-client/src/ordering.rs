//! Replica ordering engine: composes weight modifiers
//! into a lazy, weighted permutation of the cluster.

use rand::rngs::ThreadRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::RequestParameters;
use crate::replica::Replica;
use crate::request::Request;
use crate::response::ReplicaResult;
use crate::weight::WeightModifierChain;

/// A single-use, lazy iterator producing a weighted random permutation of a
/// cluster without replacement.
///
/// Not `Clone`/`Sync`-shareable across concurrent consumers by design (spec
/// §9: "must be single-consumer; do not attempt to share it across parallel
/// attempts"). Strategies that want to start several attempts concurrently
/// pull this iterator from one task and hand each emitted replica to a
/// spawned attempt.
pub struct ReplicaOrdering<'a, R = ThreadRng> {
    // (replica, weight) pairs remaining to be drawn, weight > 0.
    remaining: Vec<(Replica, f64)>,
    total_weight: f64,
    rng: R,
    chain: &'a WeightModifierChain,
}

impl<'a> ReplicaOrdering<'a, ThreadRng> {
    /// Computes weights for every replica by folding the modifier chain,
    /// then prepares the lazy draw-without-replacement state. Falls back to
    /// a uniform random permutation if every replica's weight came out to
    /// `0`, so a non-empty input cluster never produces an empty ordering.
    pub fn new(
        replicas: &[Replica],
        chain: &'a WeightModifierChain,
        request: &Request,
        parameters: &RequestParameters,
        max_weight: f64,
    ) -> Self {
        Self::with_rng(
            replicas,
            chain,
            request,
            parameters,
            max_weight,
            rand::thread_rng(),
        )
    }
}

impl<'a, R: Rng> ReplicaOrdering<'a, R> {
    /// Like [`ReplicaOrdering::new`], but with an injectable RNG so tests
    /// can assert a deterministic selection order.
    pub fn with_rng(
        replicas: &[Replica],
        chain: &'a WeightModifierChain,
        request: &Request,
        parameters: &RequestParameters,
        max_weight: f64,
        mut rng: R,
    ) -> Self {
        let mut weighted: Vec<(Replica, f64)> = replicas
            .iter()
            .map(|r| {
                let w = chain
                    .weight_for(r, replicas, request, parameters)
                    .clamp(0.0, max_weight);
                (r.clone(), w)
            })
            .collect();

        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            // All weights are zero: fall back to a uniform permutation
            // rather than return an empty ordering.
            weighted = replicas.iter().map(|r| (r.clone(), 1.0)).collect();
            weighted.shuffle(&mut rng);
            let total_weight = weighted.len() as f64;
            return ReplicaOrdering {
                remaining: weighted,
                total_weight,
                rng,
                chain,
            };
        }

        weighted.retain(|(_, w)| *w > 0.0);
        let total_weight = weighted.iter().map(|(_, w)| w).sum();
        ReplicaOrdering {
            remaining: weighted,
            total_weight,
            rng,
            chain,
        }
    }

    /// Draws the next replica: uniformly samples a point in
    /// `[0, total_weight)`, locates its cumulative bucket, removes and
    /// returns that replica, subtracting its weight from the running
    /// total. Returns `None` once every (non-zero-weight) replica has been
    /// emitted.
    pub fn next(&mut self) -> Option<Replica> {
        if self.remaining.is_empty() {
            return None;
        }
        if self.total_weight <= 0.0 {
            // Degenerate uniform-fallback path: weights are all 1.0 and the
            // list was pre-shuffled, so just pop in order.
            let (replica, _) = self.remaining.remove(0);
            return Some(replica);
        }
        let draw = self.rng.gen_range(0.0..self.total_weight);
        let mut cumulative = 0.0;
        for idx in 0..self.remaining.len() {
            cumulative += self.remaining[idx].1;
            if draw < cumulative {
                let (replica, weight) = self.remaining.remove(idx);
                self.total_weight -= weight;
                return Some(replica);
            }
        }
        // Floating-point edge case: draw landed exactly on the total due to
        // rounding. Take the last element.
        let (replica, weight) = self.remaining.pop().unwrap();
        self.total_weight -= weight;
        Some(replica)
    }

    /// Fans a completed result out to every modifier's `learn`.
    pub fn learn(&self, result: &ReplicaResult) {
        self.chain.learn(result);
    }
}

impl<'a, R: Rng> Iterator for ReplicaOrdering<'a, R> {
    type Item = Replica;

    fn next(&mut self) -> Option<Replica> {
        ReplicaOrdering::next(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use rand::rngs::mock::StepRng;

    fn replicas(n: usize) -> Vec<Replica> {
        (0..n).map(|i| Replica::new(format!("http://r{i}"))).collect()
    }

    #[test]
    fn empty_cluster_yields_empty_ordering() {
        let chain = WeightModifierChain::default();
        let request = Request::new(Method::Get, "/");
        let params = RequestParameters::default();
        let mut ordering =
            ReplicaOrdering::new(&[], &chain, &request, &params, 100.0);
        assert_eq!(ordering.next(), None);
    }

    #[test]
    fn all_zero_weight_falls_back_to_full_permutation() {
        struct ZeroModifier;
        impl crate::weight::WeightModifier for ZeroModifier {
            fn modify(
                &self,
                _: &Replica,
                _: &[Replica],
                _: &Request,
                _: &RequestParameters,
                weight: &mut f64,
            ) {
                *weight = 0.0;
            }
            fn learn(&self, _: &ReplicaResult) {}
        }
        let chain = WeightModifierChain::new(vec![Box::new(ZeroModifier)]);
        let request = Request::new(Method::Get, "/");
        let params = RequestParameters::default();
        let rs = replicas(5);
        let mut ordering = ReplicaOrdering::with_rng(
            &rs,
            &chain,
            &request,
            &params,
            100.0,
            StepRng::new(0, 1),
        );
        let mut emitted = Vec::new();
        while let Some(r) = ordering.next() {
            emitted.push(r);
        }
        emitted.sort();
        let mut expected = rs.clone();
        expected.sort();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn never_emits_a_zero_weight_replica_unless_all_are_zero() {
        struct FirstOnly;
        impl crate::weight::WeightModifier for FirstOnly {
            fn modify(
                &self,
                replica: &Replica,
                _: &[Replica],
                _: &Request,
                _: &RequestParameters,
                weight: &mut f64,
            ) {
                if replica.url() != "http://r0" {
                    *weight = 0.0;
                }
            }
            fn learn(&self, _: &ReplicaResult) {}
        }
        let chain = WeightModifierChain::new(vec![Box::new(FirstOnly)]);
        let request = Request::new(Method::Get, "/");
        let params = RequestParameters::default();
        let rs = replicas(3);
        let mut ordering =
            ReplicaOrdering::new(&rs, &chain, &request, &params, 100.0);
        let emitted: Vec<_> = std::iter::from_fn(|| ordering.next()).collect();
        assert_eq!(emitted, vec![Replica::new("http://r0")]);
    }
}
