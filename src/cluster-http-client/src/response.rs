//! The [`Response`] side of the data model.

use std::time::Duration;

use crate::request::{Body, Headers};
use crate::replica::Replica;

/// Semantic category of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    Informational,
    Success,
    Redirection,
    ClientFailure,
    ServerFailure,
    /// No HTTP status was ever obtained; the failure happened below HTTP
    /// (connect failure, timeout, transport error).
    NetworkFailure,
    Unknown,
}

/// An HTTP status code paired with its semantic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode {
    code: u16,
}

impl StatusCode {
    pub fn new(code: u16) -> Self {
        StatusCode { code }
    }

    pub fn as_u16(self) -> u16 {
        self.code
    }

    pub fn category(self) -> StatusCategory {
        match self.code {
            100..=199 => StatusCategory::Informational,
            200..=299 => StatusCategory::Success,
            300..=399 => StatusCategory::Redirection,
            400..=499 => StatusCategory::ClientFailure,
            500..=599 => StatusCategory::ServerFailure,
            _ => StatusCategory::Unknown,
        }
    }
}

/// The outcome the transport itself reports, independent of any HTTP status
/// that may or may not have been received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportVerdict {
    Success,
    Timeout,
    ConnectFailure,
    /// A streaming body could not be replayed (e.g. a retry attempted reuse
    /// of an already-consumed single-use source).
    ContentReuseFailure,
    Canceled,
    UnknownFailure,
}

/// The verdict the [`crate::classifier`] subsystem assigns to a single
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Accept,
    Reject,
    DontKnow,
}

/// One HTTP response, or a synthetic stand-in for a transport-level failure.
#[derive(Debug, Clone)]
pub struct Response {
    /// Present only when the transport verdict is `Success` (an HTTP status
    /// was actually received); other verdicts carry no status.
    pub status: Option<StatusCode>,
    pub headers: Headers,
    pub body: Body,
    pub transport_verdict: TransportVerdict,
}

impl Response {
    /// A synthetic "no-response" sentinel, used when no replica produced a
    /// response worth selecting as `ClusterResult::selected`.
    pub fn no_response() -> Self {
        Response {
            status: None,
            headers: Headers::new(),
            body: Body::None,
            transport_verdict: TransportVerdict::UnknownFailure,
        }
    }

    pub fn status_category(&self) -> StatusCategory {
        match self.status {
            Some(code) => code.category(),
            None => StatusCategory::NetworkFailure,
        }
    }
}

/// The outcome of one attempt against one replica.
///
/// Immutable once emitted; the pipeline only ever appends these to the
/// per-request accumulator, never mutates one in place.
#[derive(Debug, Clone)]
pub struct ReplicaResult {
    pub replica: Replica,
    pub response: Response,
    pub verdict: Verdict,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_categories() {
        assert_eq!(StatusCode::new(204).category(), StatusCategory::Success);
        assert_eq!(StatusCode::new(404).category(), StatusCategory::ClientFailure);
        assert_eq!(StatusCode::new(503).category(), StatusCategory::ServerFailure);
        assert_eq!(StatusCode::new(301).category(), StatusCategory::Redirection);
    }

    #[test]
    fn no_status_is_network_failure() {
        let r = Response::no_response();
        assert_eq!(r.status_category(), StatusCategory::NetworkFailure);
    }
}
