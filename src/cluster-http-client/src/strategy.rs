//! Request dispatch strategies: sequential, parallel-N,
//! and forking (hedging) dispatch over an ordered replica stream.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::Rng;

use crate::budget::TimeBudget;
use crate::context::{Cancellation, ResultAccumulator};
use crate::ordering::ReplicaOrdering;
use crate::replica::Replica;
use crate::request::Request;
use crate::response::{ReplicaResult, Verdict};
use crate::sender::RequestSender;
use crate::weight::WeightModifierChain;

/// Which dispatch policy governs a request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StrategyConfig {
    /// One attempt at a time, each bounded by a [`TimeoutsProviderKind`].
    Sequential { division_factor: usize },
    /// Up to `level` concurrent attempts; a finished non-`Accept` attempt is
    /// topped up from the stream while replicas remain.
    ParallelN { level: usize },
    /// Start one attempt; stagger additional ones at `delays[i]` if the
    /// prior attempt hasn't completed.
    Forking { delays: Vec<Duration> },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Sequential { division_factor: 1 }
    }
}

impl StrategyConfig {
    /// Parallel and forking strategies start more than one concurrent
    /// attempt; a single-use streaming body cannot legally be submitted to
    /// either.
    pub fn requires_concurrency_safe_body(&self) -> bool {
        !matches!(self, StrategyConfig::Sequential { .. })
    }
}

/// Computes the per-attempt timeout for the sequential strategy.
pub trait TimeoutsProvider: Send + Sync {
    fn next_timeout(&self, budget: &TimeBudget, replicas_remaining: usize) -> Duration;
}

/// `perAttemptTimeout = remainingBudget / min(D, N)`. Recomputed fresh
/// before every attempt from the *true* remaining budget (not a pre-
/// allocated share), so a fast-failing attempt's unused time is
/// automatically redistributed to the attempts that follow it.
pub struct EqualTimeoutsProvider {
    pub division_factor: usize,
}

impl TimeoutsProvider for EqualTimeoutsProvider {
    fn next_timeout(&self, budget: &TimeBudget, replicas_remaining: usize) -> Duration {
        let divisor = self.division_factor.max(1).min(replicas_remaining.max(1)) as u32;
        budget.remaining() / divisor
    }
}

/// Bundles the collaborators every strategy needs, so strategy entry points
/// don't grow an ever-longer parameter list as dispatch requirements
/// accrete.
pub struct StrategyContext<'a> {
    pub sender: &'a RequestSender,
    pub request: &'a Request,
    pub budget: &'a TimeBudget,
    pub cancel: &'a Cancellation,
    pub accumulator: &'a ResultAccumulator,
    pub chain: &'a WeightModifierChain,
    pub connection_timeout: Duration,
}

/// Runs `config` against `ordering`, attempting at most `cap` replicas.
/// Common termination rule across every strategy: stop on cancellation, stop
/// when the budget expires, stop when the replica stream is exhausted, stop
/// the moment any attempt's verdict is `Accept`.
pub async fn run<'s, R: Rng>(sctx: &'s StrategyContext<'s>, ordering: &mut ReplicaOrdering<'_, R>, config: &StrategyConfig, cap: usize) {
    match config {
        StrategyConfig::Sequential { division_factor } => {
            let timeouts = EqualTimeoutsProvider {
                division_factor: *division_factor,
            };
            run_sequential(sctx, ordering, &timeouts, cap).await;
        }
        StrategyConfig::ParallelN { level } => {
            run_parallel(sctx, ordering, *level, cap).await;
        }
        StrategyConfig::Forking { delays } => {
            run_forking(sctx, ordering, delays, cap).await;
        }
    }
}

async fn run_sequential<'s, R: Rng>(
    sctx: &'s StrategyContext<'s>,
    ordering: &mut ReplicaOrdering<'_, R>,
    timeouts: &dyn TimeoutsProvider,
    cap: usize,
) {
    let mut attempted = 0usize;
    let mut remaining = cap;
    while attempted < cap {
        if sctx.cancel.is_canceled() || sctx.budget.has_expired() {
            return;
        }
        let Some(replica) = ordering.next() else {
            return;
        };
        let timeout = timeouts.next_timeout(sctx.budget, remaining.max(1));
        if timeout.is_zero() {
            return;
        }
        let result = sctx
            .sender
            .send(
                &replica,
                sctx.request,
                timeout,
                sctx.connection_timeout,
                sctx.cancel,
                sctx.accumulator,
                sctx.chain,
            )
            .await;
        attempted += 1;
        remaining = remaining.saturating_sub(1);
        if result.verdict == Verdict::Accept {
            return;
        }
    }
}

/// Spawns one attempt against the next replica in `ordering` onto
/// `in_flight`, tracking its per-attempt cancellation token in `tokens` so a
/// caller can cancel it once a sibling wins. Returns `false` once the
/// ordering is exhausted.
fn spawn_attempt<'a, R: Rng>(
    sctx: &'a StrategyContext<'a>,
    ordering: &mut ReplicaOrdering<'_, R>,
    timeout: Duration,
    tokens: &mut Vec<Cancellation>,
    in_flight: &mut FuturesUnordered<BoxFuture<'a, ReplicaResult>>,
) -> bool {
    let Some(replica) = ordering.next() else {
        return false;
    };
    let token = Cancellation::new();
    tokens.push(token.clone());
    let sender = sctx.sender;
    let request = sctx.request;
    let connection_timeout = sctx.connection_timeout;
    let accumulator = sctx.accumulator;
    let chain = sctx.chain;
    in_flight.push(Box::pin(async move {
        sender
            .send(&replica, request, timeout, connection_timeout, &token, accumulator, chain)
            .await
    }));
    true
}

fn cancel_all(tokens: &[Cancellation]) {
    for token in tokens {
        token.cancel();
    }
}

/// Drives every still-pending attempt in `in_flight` to completion.
///
/// Called after a strategy has decided to stop with siblings still
/// in-flight: their cancellation tokens have already been set, so each
/// resolves promptly with a `Canceled` transport verdict, but it must still
/// be polled to do so and push its `ReplicaResult` (spec §5: "Children are
/// joined or cancelled before the parent returns"; §7: the results list is
/// always fully populated). Dropping the `FuturesUnordered` instead would
/// silently discard those results.
async fn drain(in_flight: &mut FuturesUnordered<BoxFuture<'_, ReplicaResult>>) {
    while in_flight.next().await.is_some() {}
}

async fn run_parallel<'s, R: Rng>(sctx: &'s StrategyContext<'s>, ordering: &mut ReplicaOrdering<'_, R>, level: usize, cap: usize) {
    let mut in_flight: FuturesUnordered<BoxFuture<'_, ReplicaResult>> = FuturesUnordered::new();
    let mut tokens = Vec::new();
    let mut started = 0usize;
    let timeout = sctx.budget.remaining();

    while started < level.min(cap) {
        if !spawn_attempt(sctx, ordering, timeout, &mut tokens, &mut in_flight) {
            break;
        }
        started += 1;
    }

    while !in_flight.is_empty() {
        if sctx.cancel.is_canceled() || sctx.budget.has_expired() {
            cancel_all(&tokens);
            drain(&mut in_flight).await;
            return;
        }
        match in_flight.next().await {
            Some(result) if result.verdict == Verdict::Accept => {
                cancel_all(&tokens);
                drain(&mut in_flight).await;
                return;
            }
            Some(_) => {
                if started < cap && spawn_attempt(sctx, ordering, sctx.budget.remaining(), &mut tokens, &mut in_flight) {
                    started += 1;
                }
            }
            None => return,
        }
    }
}

async fn run_forking<'s, R: Rng>(sctx: &'s StrategyContext<'s>, ordering: &mut ReplicaOrdering<'_, R>, delays: &[Duration], cap: usize) {
    let mut in_flight: FuturesUnordered<BoxFuture<'_, ReplicaResult>> = FuturesUnordered::new();
    let mut tokens = Vec::new();
    let mut started = 0usize;
    let mut delay_idx = 0usize;
    let timeout = sctx.budget.remaining();

    if !spawn_attempt(sctx, ordering, timeout, &mut tokens, &mut in_flight) {
        return;
    }
    started += 1;

    loop {
        if sctx.cancel.is_canceled() || sctx.budget.has_expired() {
            cancel_all(&tokens);
            drain(&mut in_flight).await;
            return;
        }
        if in_flight.is_empty() {
            return;
        }

        let fork_due = delays.get(delay_idx).copied().filter(|_| started < cap);
        tokio::select! {
            biased;
            result = in_flight.next() => {
                match result {
                    Some(r) if r.verdict == Verdict::Accept => {
                        cancel_all(&tokens);
                        drain(&mut in_flight).await;
                        return;
                    }
                    Some(_) => continue,
                    None => return,
                }
            }
            _ = sleep_or_pending(fork_due) => {
                if spawn_attempt(sctx, ordering, sctx.budget.remaining(), &mut tokens, &mut in_flight) {
                    started += 1;
                    delay_idx += 1;
                } else {
                    delay_idx += 1;
                }
            }
        }
    }
}

/// Sleeps for `delay` if present, otherwise never resolves — lets a
/// `tokio::select!` branch be conditionally disabled without an `if false`
/// guard on a non-cancel-safe future.
async fn sleep_or_pending(delay: Option<Duration>) {
    match delay {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_timeouts_divide_by_min_of_divisor_and_remaining() {
        let budget = TimeBudget::new(Duration::from_secs(9));
        let provider = EqualTimeoutsProvider { division_factor: 3 };
        assert_eq!(provider.next_timeout(&budget, 3), Duration::from_secs(3));
        assert_eq!(provider.next_timeout(&budget, 1), Duration::from_secs(9));
    }

    #[test]
    fn parallel_and_forking_require_concurrency_safe_bodies() {
        assert!(!StrategyConfig::Sequential { division_factor: 1 }.requires_concurrency_safe_body());
        assert!(StrategyConfig::ParallelN { level: 2 }.requires_concurrency_safe_body());
        assert!(StrategyConfig::Forking { delays: vec![] }.requires_concurrency_safe_body());
    }
}
