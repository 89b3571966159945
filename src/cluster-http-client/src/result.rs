//! Cluster result selector: folds per-replica results
//! and budget state into one terminal [`ClusterResult`].

use crate::config::RequestParameters;
use crate::request::Request;
use crate::response::{ReplicaResult, Response, Verdict};

/// The terminal outcome of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterResultStatus {
    Success,
    ReplicasNotFound,
    ReplicasExhausted,
    TimeExpired,
    Throttled,
    IncorrectArguments,
    UnexpectedException,
    Canceled,
}

/// The full outcome of one logical request: terminal status, every
/// [`ReplicaResult`] produced along the way, a selected response, and the
/// original request.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// Echoes the `RequestContext::request_id` this result was produced
    /// under, so a caller can correlate a `ClusterResult` with the
    /// `request_id` field on this request's tracing spans.
    pub request_id: uuid::Uuid,
    pub status: ClusterResultStatus,
    pub replica_results: Vec<ReplicaResult>,
    pub selected: Response,
    pub request: Request,
}

impl ClusterResult {
    /// Short-circuit result for a request that never reaches replica
    /// dispatch (validation failures, empty topology, throttling).
    pub fn terminal(request_id: uuid::Uuid, status: ClusterResultStatus, request: Request) -> Self {
        ClusterResult {
            request_id,
            status,
            replica_results: Vec::new(),
            selected: Response::no_response(),
            request,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ClusterResultStatus::Success
    }
}

/// Picks one response out of a frozen [`ReplicaResult`] list.
pub trait ResponseSelector: Send + Sync {
    fn select(&self, request: &Request, parameters: &RequestParameters, results: &[ReplicaResult]) -> Response;
}

/// The default selector: best-by-verdict (`Accept` > `DontKnow` > `Reject`),
/// tied entries broken by recency. `results` is in completion order, so the
/// later index among tied verdicts is the more recent attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestVerdictResponseSelector;

fn verdict_rank(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Accept => 2,
        Verdict::DontKnow => 1,
        Verdict::Reject => 0,
    }
}

impl ResponseSelector for BestVerdictResponseSelector {
    fn select(&self, _request: &Request, _parameters: &RequestParameters, results: &[ReplicaResult]) -> Response {
        results
            .iter()
            .enumerate()
            .max_by_key(|(index, result)| (verdict_rank(result.verdict), *index))
            .map(|(_, result)| result.response.clone())
            .unwrap_or_else(Response::no_response)
    }
}

/// Computes the terminal status from a frozen result list plus the two
/// flags the execution module observed while the strategy ran, applying a
/// first-match-wins priority order.
pub fn select_status(results: &[ReplicaResult], budget_expired: bool, canceled: bool) -> ClusterResultStatus {
    if results.iter().any(|r| r.verdict == Verdict::Accept) {
        return ClusterResultStatus::Success;
    }
    if budget_expired {
        return ClusterResultStatus::TimeExpired;
    }
    if canceled {
        return ClusterResultStatus::Canceled;
    }
    if !results.is_empty() && results.iter().all(|r| r.verdict == Verdict::Reject) {
        return ClusterResultStatus::ReplicasExhausted;
    }
    ClusterResultStatus::UnexpectedException
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::Replica;
    use std::time::Duration;

    fn result(replica: &str, verdict: Verdict) -> ReplicaResult {
        ReplicaResult {
            replica: Replica::new(replica),
            response: Response::no_response(),
            verdict,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn any_accept_is_success_regardless_of_other_flags() {
        let results = vec![result("a", Verdict::Reject), result("b", Verdict::Accept)];
        assert_eq!(select_status(&results, true, true), ClusterResultStatus::Success);
    }

    #[test]
    fn all_reject_without_expiry_or_cancel_is_exhausted() {
        let results = vec![result("a", Verdict::Reject), result("b", Verdict::Reject)];
        assert_eq!(select_status(&results, false, false), ClusterResultStatus::ReplicasExhausted);
    }

    #[test]
    fn expiry_wins_over_cancel_when_no_accept() {
        let results = vec![result("a", Verdict::DontKnow)];
        assert_eq!(select_status(&results, true, true), ClusterResultStatus::TimeExpired);
    }

    #[test]
    fn empty_results_is_unexpected_exception() {
        assert_eq!(select_status(&[], false, false), ClusterResultStatus::UnexpectedException);
    }

    #[test]
    fn selector_prefers_accept_then_recency_on_ties() {
        let results = vec![
            result("a", Verdict::Reject),
            result("b", Verdict::Reject),
        ];
        let selected = BestVerdictResponseSelector.select(
            &Request::new(crate::request::Method::Get, "/"),
            &RequestParameters::default(),
            &results,
        );
        // Both rejected; recency (index) breaks the tie, so "b" (the later
        // of two equally-ranked verdicts) is the synthetic no-response
        // carried over — assert indirectly via which replica's response
        // would have been chosen if they differed.
        assert_eq!(selected.transport_verdict, results[1].response.transport_verdict);
    }
}
