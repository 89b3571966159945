//! Response classifier: applies an ordered list of
//! criteria to a response, returning the first non-`DontKnow` verdict.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::response::{Response, StatusCategory, Verdict};

/// One voter in a [`ResponseClassifier`]'s criteria list.
pub trait ResponseCriterion: Send + Sync {
    /// Votes on `response`, abstaining with `DontKnow` if this criterion has
    /// no opinion.
    fn classify(&self, response: &Response) -> Verdict;

    /// Whether this criterion is guaranteed to never abstain. A criteria
    /// list's last entry must satisfy this.
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Always votes `Accept`. A valid terminal criterion.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAccept;

impl ResponseCriterion for AlwaysAccept {
    fn classify(&self, _response: &Response) -> Verdict {
        Verdict::Accept
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// Always votes `Reject`. A valid terminal criterion.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReject;

impl ResponseCriterion for AlwaysReject {
    fn classify(&self, _response: &Response) -> Verdict {
        Verdict::Reject
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// Votes `Accept` for a status in `Success`, `Reject` for `ServerFailure` or
/// `NetworkFailure`, and abstains otherwise — the common case for a
/// retriable client: server-side and transport failures are worth trying
/// another replica, client errors and redirects are not this classifier's
/// business.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardStatusCriterion;

impl ResponseCriterion for StandardStatusCriterion {
    fn classify(&self, response: &Response) -> Verdict {
        match response.status_category() {
            StatusCategory::Success => Verdict::Accept,
            StatusCategory::ServerFailure | StatusCategory::NetworkFailure => Verdict::Reject,
            _ => Verdict::DontKnow,
        }
    }
}

/// Votes `Reject` for any status in `category`, abstains otherwise. Useful
/// for callers who want to treat a specific, non-standard status (e.g. a
/// 429) as worth retrying elsewhere without changing the rest of the chain.
pub struct StatusCategoryRejectCriterion {
    pub category: StatusCategory,
}

impl ResponseCriterion for StatusCategoryRejectCriterion {
    fn classify(&self, response: &Response) -> Verdict {
        if response.status_category() == self.category {
            Verdict::Reject
        } else {
            Verdict::DontKnow
        }
    }
}

/// An ordered list of [`ResponseCriterion`], applied in order; the first
/// non-`DontKnow` vote wins, and the list's last entry must be terminal so a
/// verdict is always reached.
pub struct ResponseClassifier {
    criteria: Vec<Arc<dyn ResponseCriterion>>,
}

impl ResponseClassifier {
    pub fn new(criteria: Vec<Arc<dyn ResponseCriterion>>) -> Result<Self> {
        if criteria.is_empty() {
            return Err(Error::EmptyList {
                field: "classifier.criteria",
            });
        }
        if !criteria.last().unwrap().is_terminal() {
            return Err(Error::NonTerminalCriteria);
        }
        Ok(ResponseClassifier { criteria })
    }

    /// The default chain used when a client does not register its own:
    /// [`StandardStatusCriterion`] followed by a terminal [`AlwaysReject`],
    /// so an ambiguous status (e.g. a redirect) is treated conservatively.
    pub fn standard() -> Self {
        ResponseClassifier {
            criteria: vec![Arc::new(StandardStatusCriterion), Arc::new(AlwaysReject)],
        }
    }

    pub fn classify(&self, response: &Response) -> Verdict {
        for criterion in &self.criteria {
            match criterion.classify(response) {
                Verdict::DontKnow => continue,
                verdict => return verdict,
            }
        }
        Verdict::DontKnow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{StatusCode, TransportVerdict};
    use crate::request::{Body, Headers};

    fn response_with_status(code: u16) -> Response {
        Response {
            status: Some(StatusCode::new(code)),
            headers: Headers::new(),
            body: Body::None,
            transport_verdict: TransportVerdict::Success,
        }
    }

    #[test]
    fn rejects_non_terminal_last_criterion() {
        let err = ResponseClassifier::new(vec![Arc::new(StandardStatusCriterion)]).unwrap_err();
        assert!(matches!(err, Error::NonTerminalCriteria));
    }

    #[test]
    fn rejects_empty_list() {
        let err = ResponseClassifier::new(vec![]).unwrap_err();
        assert!(matches!(err, Error::EmptyList { .. }));
    }

    #[test]
    fn standard_chain_accepts_2xx_rejects_5xx_and_falls_through_on_4xx() {
        let classifier = ResponseClassifier::standard();
        assert_eq!(classifier.classify(&response_with_status(200)), Verdict::Accept);
        assert_eq!(classifier.classify(&response_with_status(503)), Verdict::Reject);
        // 4xx is not retriable against another replica, and the terminal
        // AlwaysReject still has to produce a verdict: Reject.
        assert_eq!(classifier.classify(&response_with_status(404)), Verdict::Reject);
    }

    #[test]
    fn network_failure_with_no_status_is_rejected() {
        let classifier = ResponseClassifier::standard();
        assert_eq!(classifier.classify(&Response::no_response()), Verdict::Reject);
    }
}
