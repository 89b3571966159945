//! The `Client`: wires every component into a pipeline and exposes the
//! single public entry point, `execute`.

use std::sync::Arc;
use std::time::Instant;

use prometheus::Registry;

use crate::classifier::ResponseClassifier;
use crate::config::{ClientConfig, RequestParameters};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::metrics::ClientMetrics;
use crate::pipeline::{Pipeline, PipelineBuilder, RequestTransform, ResponseTransform};
use crate::request::Request;
use crate::result::{BestVerdictResponseSelector, ClusterResult, ResponseSelector};
use crate::retry::{NoRetryPolicy, RetryPolicy};
use crate::sender::RequestSender;
use crate::storage::ReplicaStorageScope;
use crate::transport::{ClusterProvider, RebaseReplicaTransform, ReplicaTransform, Transport};
use crate::weight::{WeightModifier, WeightModifierChain};

/// Resolves the [`crate::weight::WeightModifierChain`] a [`RequestContext`]
/// should use, honouring `ClientConfig::replica_storage_scope`:
/// `Process` shares one chain (and therefore one set of modifier-owned
/// [`crate::storage::ReplicaStorage`] instances) across every request;
/// `Request` builds a fresh chain — and fresh storage — per request.
pub(crate) enum ModifierChainSource {
    Shared(Arc<WeightModifierChain>),
    PerRequest(Arc<dyn Fn() -> WeightModifierChain + Send + Sync>),
}

impl ModifierChainSource {
    pub(crate) fn chain_for_request(&self) -> Arc<WeightModifierChain> {
        match self {
            ModifierChainSource::Shared(chain) => chain.clone(),
            ModifierChainSource::PerRequest(factory) => Arc::new(factory()),
        }
    }
}

/// The collaborators and configuration shared by every request a `Client`
/// issues; cheap to clone (everything behind an `Arc`) and held by each
/// [`RequestContext`].
pub(crate) struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub cluster_provider: Arc<dyn ClusterProvider>,
    pub modifier_chain_source: ModifierChainSource,
    pub config: ClientConfig,
    pub metrics: Arc<ClientMetrics>,
}

/// Builds a [`Client`], applying `ClientConfig`'s validation rules before
/// one can be produced.
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    cluster_provider: Option<Arc<dyn ClusterProvider>>,
    replica_transform: Arc<dyn ReplicaTransform>,
    modifier_factories: Vec<Arc<dyn Fn() -> Box<dyn WeightModifier> + Send + Sync>>,
    classifier: Option<Arc<ResponseClassifier>>,
    retry_policy: Arc<dyn RetryPolicy>,
    response_selector: Arc<dyn ResponseSelector>,
    config: ClientConfig,
    pipeline_builder: PipelineBuilder,
    metrics_registry: Registry,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        let config = ClientConfig::default();
        ClientBuilder {
            transport: None,
            cluster_provider: None,
            replica_transform: Arc::new(RebaseReplicaTransform),
            modifier_factories: Vec::new(),
            classifier: None,
            retry_policy: Arc::new(NoRetryPolicy),
            response_selector: Arc::new(BestVerdictResponseSelector),
            pipeline_builder: PipelineBuilder::new(config.validate_http_method),
            config,
            metrics_registry: Registry::new(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cluster_provider(mut self, cluster_provider: Arc<dyn ClusterProvider>) -> Self {
        self.cluster_provider = Some(cluster_provider);
        self
    }

    pub fn replica_transform(mut self, replica_transform: Arc<dyn ReplicaTransform>) -> Self {
        self.replica_transform = replica_transform;
        self
    }

    /// Registers a weight modifier factory. Called once up front when
    /// `replicaStorageScope = Process` (the modifier and its storage live
    /// for the client's lifetime); called fresh for every request when
    /// `replicaStorageScope = Request`.
    pub fn weight_modifier<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn WeightModifier> + Send + Sync + 'static,
    {
        self.modifier_factories.push(Arc::new(factory));
        self
    }

    pub fn classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn response_selector(mut self, response_selector: Arc<dyn ResponseSelector>) -> Self {
        self.response_selector = response_selector;
        self
    }

    pub fn request_transform(mut self, transform: Arc<dyn RequestTransform>) -> Self {
        self.pipeline_builder.register_request_transform(transform);
        self
    }

    pub fn response_transform(mut self, transform: Arc<dyn ResponseTransform>) -> Self {
        self.pipeline_builder.register_response_transform(transform);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.pipeline_builder = PipelineBuilder::new(config.validate_http_method);
        self.config = config;
        self
    }

    pub fn build(mut self) -> Result<Client> {
        self.config.validate()?;
        let transport = self.transport.ok_or(Error::TransportUnset)?;
        let cluster_provider = self.cluster_provider.ok_or(Error::ClusterProviderUnset)?;
        let classifier = self.classifier.unwrap_or_else(|| Arc::new(ResponseClassifier::standard()));

        if self.modifier_factories.is_empty() {
            return Err(Error::NoWeightModifiers);
        }

        let build_chain = {
            let factories = self.modifier_factories.clone();
            move || WeightModifierChain::new(factories.iter().map(|f| f()).collect())
        };

        let modifier_chain_source = match self.config.replica_storage_scope {
            ReplicaStorageScope::Process => ModifierChainSource::Shared(Arc::new(build_chain())),
            ReplicaStorageScope::Request => ModifierChainSource::PerRequest(Arc::new(build_chain)),
        };

        let metrics = Arc::new(ClientMetrics::register(&self.metrics_registry).map_err(Error::MetricsRegistration)?);

        let sender = Arc::new(RequestSender::new(
            transport.clone(),
            self.replica_transform.clone(),
            classifier,
            metrics.clone(),
            self.config.logging.clone(),
        ));

        let collaborators = Arc::new(Collaborators {
            transport,
            cluster_provider,
            modifier_chain_source,
            config: self.config.clone(),
            metrics: metrics.clone(),
        });

        self.pipeline_builder.logging(self.config.logging.clone());
        let pipeline = self.pipeline_builder.build(
            sender,
            self.retry_policy,
            self.response_selector,
            self.config.deduplicate_request_url,
            self.config.max_weight,
        );

        Ok(Client {
            collaborators,
            pipeline,
            metrics,
        })
    }
}

/// An executing `Client`: one pipeline wired to a fixed set of
/// collaborators. Cheap to hold as a long-lived `Arc<Client>` — everything
/// it owns is itself behind an `Arc` or immutable.
pub struct Client {
    collaborators: Arc<Collaborators>,
    pipeline: Pipeline,
    metrics: Arc<ClientMetrics>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Runs one logical request through the pipeline to a terminal
    /// [`ClusterResult`]. Never returns an `Err`: every failure mode this
    /// crate recognizes is a `ClusterResultStatus` variant, not an
    /// exception.
    pub async fn execute(&self, request: Request, parameters: RequestParameters) -> ClusterResult {
        let started = Instant::now();
        let mut ctx = RequestContext::new(request, parameters, self.collaborators.clone());
        let result = self.pipeline.execute(&mut ctx).await;
        self.metrics.record_result(result.status, started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthParams, PerCriterionPolicy};
    use crate::request::{Capability, Method};
    use crate::response::{Response, StatusCode, TransportVerdict};
    use crate::weight::AdaptiveHealthModifier;
    use async_trait::async_trait;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(
            &self,
            _request: &Request,
            _connection_timeout: std::time::Duration,
            _request_timeout: std::time::Duration,
            _cancel: &crate::context::Cancellation,
        ) -> std::result::Result<Response, crate::transport::TransportError> {
            Ok(Response {
                status: Some(StatusCode::new(200)),
                headers: crate::request::Headers::new(),
                body: crate::request::Body::None,
                transport_verdict: TransportVerdict::Success,
            })
        }

        fn supports(&self, _capability: Capability) -> bool {
            true
        }
    }

    struct FixedCluster(Vec<crate::replica::Replica>);

    impl ClusterProvider for FixedCluster {
        fn get_cluster(&self) -> Vec<crate::replica::Replica> {
            self.0.clone()
        }
    }

    fn test_client(replicas: Vec<&str>) -> Client {
        Client::builder()
            .transport(Arc::new(EchoTransport))
            .cluster_provider(Arc::new(FixedCluster(
                replicas.into_iter().map(crate::replica::Replica::new).collect(),
            )))
            .weight_modifier(|| Box::new(AdaptiveHealthModifier::scalar(HealthParams::default(), PerCriterionPolicy)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_request_against_one_replica() {
        let client = test_client(vec!["http://a"]);
        let result = client
            .execute(Request::new(Method::Get, "/"), RequestParameters::default())
            .await;
        assert!(result.is_success());
        assert_eq!(result.replica_results.len(), 1);
    }

    #[tokio::test]
    async fn empty_cluster_is_replicas_not_found() {
        let client = test_client(vec![]);
        let result = client
            .execute(Request::new(Method::Get, "/"), RequestParameters::default())
            .await;
        assert_eq!(result.status, crate::result::ClusterResultStatus::ReplicasNotFound);
    }

    #[test]
    fn build_fails_without_transport() {
        let err = Client::builder()
            .cluster_provider(Arc::new(FixedCluster(vec![])))
            .weight_modifier(|| Box::new(AdaptiveHealthModifier::scalar(HealthParams::default(), PerCriterionPolicy)))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::TransportUnset));
    }

    #[test]
    fn build_fails_without_cluster_provider() {
        let err = Client::builder()
            .transport(Arc::new(EchoTransport))
            .weight_modifier(|| Box::new(AdaptiveHealthModifier::scalar(HealthParams::default(), PerCriterionPolicy)))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ClusterProviderUnset));
    }
}
