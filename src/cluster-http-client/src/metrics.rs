//! Ambient metrics: a small set of `prometheus`
//! collectors registered once per [`crate::Client`] and updated from the
//! pipeline. Unconditional — always collected regardless of which features
//! a given request path exercises, the same way the teacher codebase's
//! controllers always register their metrics.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Metrics collected across every request a [`crate::Client`] issues.
#[derive(Clone)]
pub struct ClientMetrics {
    pub attempts_total: IntCounterVec,
    pub cluster_result_status_total: IntCounterVec,
    pub request_latency_seconds: HistogramVec,
}

impl ClientMetrics {
    /// Registers this client's collectors into `registry`. Returns an error
    /// if a metric with a colliding name is already registered, which
    /// `prometheus` treats as a registration failure rather than a panic.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "cluster_http_client_attempts_total",
                "Replica attempts, labeled by the verdict they were classified with.",
            ),
            &["verdict"],
        )?;
        let cluster_result_status_total = IntCounterVec::new(
            Opts::new(
                "cluster_http_client_cluster_result_status_total",
                "Terminal logical-request outcomes, labeled by status.",
            ),
            &["status"],
        )?;
        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cluster_http_client_request_latency_seconds",
                "End-to-end latency of a logical request, from pipeline entry to terminal result.",
            ),
            &["status"],
        )?;

        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(cluster_result_status_total.clone()))?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        Ok(ClientMetrics {
            attempts_total,
            cluster_result_status_total,
            request_latency_seconds,
        })
    }

    pub fn record_attempt(&self, verdict: crate::response::Verdict) {
        self.attempts_total.with_label_values(&[verdict_label(verdict)]).inc();
    }

    pub fn record_result(&self, status: crate::result::ClusterResultStatus, elapsed: std::time::Duration) {
        let label = status_label(status);
        self.cluster_result_status_total.with_label_values(&[label]).inc();
        self.request_latency_seconds
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());
    }
}

fn verdict_label(verdict: crate::response::Verdict) -> &'static str {
    match verdict {
        crate::response::Verdict::Accept => "accept",
        crate::response::Verdict::Reject => "reject",
        crate::response::Verdict::DontKnow => "dont_know",
    }
}

fn status_label(status: crate::result::ClusterResultStatus) -> &'static str {
    use crate::result::ClusterResultStatus::*;
    match status {
        Success => "success",
        ReplicasNotFound => "replicas_not_found",
        ReplicasExhausted => "replicas_exhausted",
        TimeExpired => "time_expired",
        Throttled => "throttled",
        IncorrectArguments => "incorrect_arguments",
        UnexpectedException => "unexpected_exception",
        Canceled => "canceled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_collision() {
        let registry = Registry::new();
        let metrics = ClientMetrics::register(&registry).unwrap();
        metrics.record_attempt(crate::response::Verdict::Accept);
        metrics.record_result(
            crate::result::ClusterResultStatus::Success,
            std::time::Duration::from_millis(5),
        );
        let families = registry.gather();
        assert_eq!(families.len(), 3);
    }
}
