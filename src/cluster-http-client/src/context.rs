//! The per-request mutable object (spec §3 `RequestContext`) and its
//! supporting concurrency primitives: cancellation and the append-only
//! result accumulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::sync::Notify;
use tracing::Span;

use crate::budget::TimeBudget;
use crate::client::Collaborators;
use crate::config::RequestParameters;
use crate::request::Request;
use crate::response::ReplicaResult;
use crate::weight::WeightModifierChain;

/// A cooperative cancellation signal threaded through one logical request.
///
/// Cloning shares the same underlying flag: every clone observes a `cancel`
/// call made through any other clone. Built on `tokio::sync::Notify` rather
/// than a `CancellationToken` from an external crate, since the rest of the
/// dependency stack already gives us everything a single-flag broadcast
/// needs.
#[derive(Clone)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once this token has been canceled. Safe to poll repeatedly
    /// and to race against other futures in a `select!`.
    pub async fn cancelled(&self) {
        loop {
            if self.is_canceled() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Cancellation::new()
    }
}

/// The concurrent, append-only accumulator of [`ReplicaResult`]s for one
/// logical request (spec §3, §5: "protected by a lock-free queue or
/// equivalent").
#[derive(Default)]
pub struct ResultAccumulator(SegQueue<ReplicaResult>);

impl ResultAccumulator {
    pub fn new() -> Self {
        ResultAccumulator(SegQueue::new())
    }

    pub fn push(&self, result: ReplicaResult) {
        self.0.push(result);
    }

    /// Freezes the accumulator into the ordered (completion-order) list the
    /// execution module hands to the response selector and status selector
    /// (spec §4.10 step 4).
    pub fn freeze(&self) -> Vec<ReplicaResult> {
        let mut results = Vec::new();
        while let Some(result) = self.0.pop() {
            results.push(result);
        }
        results
    }
}

/// The mutable per-request object threaded through the pipeline.
/// Created at pipeline entry, dropped at pipeline exit; never escapes the
/// pipeline.
pub struct RequestContext {
    pub request_id: uuid::Uuid,
    pub request: Request,
    pub parameters: RequestParameters,
    pub budget: TimeBudget,
    pub cancel: Cancellation,
    pub log: Span,
    pub max_replicas_used_per_request: i64,
    pub accumulator: ResultAccumulator,
    pub modifier_chain: Arc<WeightModifierChain>,
    pub(crate) collaborators: Arc<Collaborators>,
}

impl RequestContext {
    pub(crate) fn new(
        request: Request,
        parameters: RequestParameters,
        collaborators: Arc<Collaborators>,
    ) -> Self {
        let requested_timeout = parameters.timeout_override.unwrap_or(collaborators.config.default_timeout);
        let budget = TimeBudget::new(requested_timeout.min(collaborators.config.default_timeout));
        let modifier_chain = collaborators.modifier_chain_source.chain_for_request();
        let request_id = uuid::Uuid::new_v4();
        let log = tracing::info_span!(
            "cluster_http_request",
            request_id = %request_id,
            method = ?request.method,
            target = %request.target,
            priority = tracing::field::Empty,
        );
        RequestContext {
            request_id,
            max_replicas_used_per_request: collaborators.config.max_replicas_used_per_request,
            request,
            parameters,
            budget,
            cancel: Cancellation::new(),
            log,
            accumulator: ResultAccumulator::new(),
            modifier_chain,
            collaborators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancellation_wakes_waiters() {
        let cancel = Cancellation::new();
        let waiter = cancel.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        assert!(!cancel.is_canceled());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation should wake the waiter promptly")
            .unwrap();
    }

    #[test]
    fn accumulator_freezes_in_completion_order() {
        use crate::replica::Replica;
        use crate::response::{Response, Verdict};

        let accumulator = ResultAccumulator::new();
        for i in 0..3 {
            accumulator.push(ReplicaResult {
                replica: Replica::new(format!("http://r{i}")),
                response: Response::no_response(),
                verdict: Verdict::Reject,
                elapsed: Duration::from_millis(1),
            });
        }
        let frozen = accumulator.freeze();
        assert_eq!(frozen.len(), 3);
        assert_eq!(frozen[0].replica, Replica::new("http://r0"));
        assert_eq!(frozen[2].replica, Replica::new("http://r2"));
    }
}
