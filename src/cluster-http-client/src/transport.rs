//! Required collaborator interfaces: narrow capability traits the
//! caller implements and hands to a [`crate::Client`]. None of their
//! concrete implementations (sockets, TLS, discovery backends) live in this
//! crate — only the contracts do.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::Cancellation;
use crate::replica::Replica;
use crate::request::{Capability, Request};
use crate::response::Response;

/// What the transport reports when it cannot hand back a [`Response`] at
/// all. Distinct from an HTTP error status, which *is* a `Response`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection could not be established")]
    ConnectFailure,
    #[error("request body could not be replayed")]
    ContentReuseFailure,
    #[error("transport failure: {0}")]
    Other(#[source] anyhow::Error),
}

/// The concrete byte-level transport. Out of scope for this crate:
/// only the contract a dispatch strategy relies on appears here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and awaits a response, honouring `cancel` promptly.
    /// `connection_timeout` bounds connection establishment only;
    /// `request_timeout` bounds the whole attempt. A transport that exceeds
    /// either internally is expected to return before the caller's own
    /// `tokio::time::timeout` wrapper fires, but [`crate::sender::RequestSender`]
    /// enforces the bound regardless.
    async fn send(
        &self,
        request: &Request,
        connection_timeout: Duration,
        request_timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<Response, TransportError>;

    /// Whether this transport can carry a body requiring `capability`.
    fn supports(&self, capability: Capability) -> bool;
}

/// Discovers the current set of replicas serving a logical cluster. Out of
/// scope for this crate: how the list is actually produced (DNS, a control
/// plane, a static file) is the caller's concern.
pub trait ClusterProvider: Send + Sync {
    /// Returns the current cluster, or an empty vec if none is known. Must
    /// be cheap: the execution module (C10) calls this once per logical
    /// request.
    fn get_cluster(&self) -> Vec<Replica>;
}

/// Rebases a request's target URL against a chosen replica's base URL.
/// Idempotent: applying it twice to an already-absolute request must be a
/// no-op.
pub trait ReplicaTransform: Send + Sync {
    fn transform(&self, replica: &Replica, request: &Request) -> Request;
}

/// Joins a replica's base URL with a request's target, unless the target is
/// already absolute.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebaseReplicaTransform;

impl ReplicaTransform for RebaseReplicaTransform {
    fn transform(&self, replica: &Replica, request: &Request) -> Request {
        let mut rebased = request.clone();
        if !(rebased.target.starts_with("http://") || rebased.target.starts_with("https://")) {
            let base = replica.url();
            let sep = if rebased.target.starts_with('/') { "" } else { "/" };
            rebased.target = format!("{base}{sep}{}", rebased.target);
        }
        rebased
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    #[test]
    fn rebase_joins_relative_target() {
        let transform = RebaseReplicaTransform;
        let replica = Replica::new("http://host:1");
        let request = Request::new(Method::Get, "/widgets");
        let rebased = transform.transform(&replica, &request);
        assert_eq!(rebased.target, "http://host:1/widgets");
    }

    #[test]
    fn rebase_leaves_absolute_target_alone() {
        let transform = RebaseReplicaTransform;
        let replica = Replica::new("http://host:1");
        let request = Request::new(Method::Get, "http://other/widgets");
        let rebased = transform.transform(&replica, &request);
        assert_eq!(rebased.target, "http://other/widgets");
    }
}
