//! Request sender: a single-replica attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::classifier::ResponseClassifier;
use crate::config::LoggingConfig;
use crate::context::{Cancellation, ResultAccumulator};
use crate::metrics::ClientMetrics;
use crate::replica::Replica;
use crate::request::Request;
use crate::response::{ReplicaResult, Response, TransportVerdict};
use crate::transport::{Transport, TransportError, ReplicaTransform};
use crate::weight::WeightModifierChain;

/// Runs one attempt against one replica: rebases the request, invokes the
/// transport, classifies the result, appends it to the context's
/// accumulator, and feeds it back to the ordering's weight modifiers.
///
/// Stateless beyond its collaborators, so one instance is shared across every
/// request and every concurrent attempt within a request; the modifier chain
/// to `learn` from is passed in per call, since it may differ per request
/// when `replicaStorageScope = Request`.
pub struct RequestSender {
    transport: Arc<dyn Transport>,
    replica_transform: Arc<dyn ReplicaTransform>,
    classifier: Arc<ResponseClassifier>,
    metrics: Arc<ClientMetrics>,
    logging: LoggingConfig,
}

impl RequestSender {
    pub fn new(
        transport: Arc<dyn Transport>,
        replica_transform: Arc<dyn ReplicaTransform>,
        classifier: Arc<ResponseClassifier>,
        metrics: Arc<ClientMetrics>,
        logging: LoggingConfig,
    ) -> Self {
        RequestSender {
            transport,
            replica_transform,
            classifier,
            metrics,
            logging,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send(
        &self,
        replica: &Replica,
        request: &Request,
        timeout: Duration,
        connection_timeout: Duration,
        cancel: &Cancellation,
        accumulator: &ResultAccumulator,
        chain: &WeightModifierChain,
    ) -> ReplicaResult {
        let started = Instant::now();
        let transformed = self.replica_transform.transform(replica, request);
        if self.logging.log_replica_requests {
            debug!(replica = %replica, target = %transformed.target, "issuing replica request");
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => canceled_response(),
            outcome = tokio::time::timeout(
                timeout,
                self.transport.send(&transformed, connection_timeout, timeout, cancel),
            ) => match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => error_response(err),
                Err(_elapsed) => timeout_response(),
            },
        };

        let verdict = self.classifier.classify(&response);
        let result = ReplicaResult {
            replica: replica.clone(),
            response,
            verdict,
            elapsed: started.elapsed(),
        };
        if self.logging.log_replica_results {
            debug!(replica = %result.replica, verdict = ?result.verdict, elapsed_ms = result.elapsed.as_millis() as u64, "replica attempt completed");
        }
        self.metrics.record_attempt(result.verdict);
        accumulator.push(result.clone());
        chain.learn(&result);
        result
    }
}

fn canceled_response() -> Response {
    Response {
        status: None,
        headers: crate::request::Headers::new(),
        body: crate::request::Body::None,
        transport_verdict: TransportVerdict::Canceled,
    }
}

fn timeout_response() -> Response {
    Response {
        status: None,
        headers: crate::request::Headers::new(),
        body: crate::request::Body::None,
        transport_verdict: TransportVerdict::Timeout,
    }
}

fn error_response(err: TransportError) -> Response {
    let transport_verdict = match err {
        TransportError::ConnectFailure => TransportVerdict::ConnectFailure,
        TransportError::ContentReuseFailure => TransportVerdict::ContentReuseFailure,
        TransportError::Other(_) => TransportVerdict::UnknownFailure,
    };
    Response {
        status: None,
        headers: crate::request::Headers::new(),
        body: crate::request::Body::None,
        transport_verdict,
    }
}
