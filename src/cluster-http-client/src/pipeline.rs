//! Pipeline runtime: builds and executes the ordered
//! module chain.
//!
//! A pipeline is a list of modules grouped into the ordinal groups of spec
//! §4.9, executed outermost (`LeakPrevention`) to innermost (`Execution`).
//! The source models a module as an object holding a continuation; here that
//! continuation is [`Next`], an index into the remaining module slice. Since
//! a slice reference is `Copy`, `Next` is too — which is what lets
//! [`crate::retry::RetryPolicy`]'s module call it more than once (spec
//! §4.9's sanctioned exception to "calls `next` at most once").

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, info, warn, Level};

use crate::classifier::ResponseCriterion;
use crate::config::LoggingConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::ordering::ReplicaOrdering;
use crate::replica::dedupe;
use crate::request::Request;
use crate::response::Response;
use crate::result::{select_status, ClusterResult, ClusterResultStatus, ResponseSelector};
use crate::retry::RetryPolicy;
use crate::sender::RequestSender;
use crate::strategy::{self, StrategyConfig, StrategyContext};

/// The ordinal groups a module belongs to. Groups execute
/// outermost to innermost in the order declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleGroup {
    LeakPrevention,
    GlobalErrorHandling,
    RequestTransformation,
    Priority,
    Logging,
    ResponseTransformation,
    RequestErrorHandling,
    RequestValidation,
    TimeoutValidation,
    Retry,
    Sending,
    Execution,
}

impl ModuleGroup {
    const ORDER: [ModuleGroup; 12] = [
        ModuleGroup::LeakPrevention,
        ModuleGroup::GlobalErrorHandling,
        ModuleGroup::RequestTransformation,
        ModuleGroup::Priority,
        ModuleGroup::Logging,
        ModuleGroup::ResponseTransformation,
        ModuleGroup::RequestErrorHandling,
        ModuleGroup::RequestValidation,
        ModuleGroup::TimeoutValidation,
        ModuleGroup::Retry,
        ModuleGroup::Sending,
        ModuleGroup::Execution,
    ];

    fn ordinal(self) -> usize {
        Self::ORDER.iter().position(|g| *g == self).expect("ModuleGroup::ORDER is exhaustive")
    }
}

/// One stage of the pipeline. Must call `next` at most once unless
/// short-circuiting with a synthetic [`ClusterResult`]; must propagate
/// cancellation promptly; must not mutate the request after `next` returns.
#[async_trait]
pub trait Module: Send + Sync {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult;
}

/// The continuation handed to a [`Module`]: the remainder of the pipeline.
/// `Copy` because it is just a borrowed slice — ordinary modules call
/// `.run()` once and drop it; [`crate::retry::RetryPolicy`]-driven retries
/// are the one case that legitimately calls it again.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    modules: &'a [Arc<dyn Module>],
}

impl<'a> Next<'a> {
    pub async fn run(self, ctx: &mut RequestContext) -> ClusterResult {
        match self.modules.split_first() {
            Some((module, rest)) => module.execute(ctx, Next { modules: rest }).await,
            None => ClusterResult::terminal(ctx.request_id, ClusterResultStatus::UnexpectedException, ctx.request.clone()),
        }
    }
}

/// The built, executable module chain.
pub struct Pipeline {
    modules: Vec<Arc<dyn Module>>,
}

impl Pipeline {
    pub async fn execute(&self, ctx: &mut RequestContext) -> ClusterResult {
        Next { modules: &self.modules }.run(ctx).await
    }
}

/// Registers user-supplied modules into their ordinal groups and seeds the
/// built-in default modules for each group.
pub struct PipelineBuilder {
    groups: [Vec<Arc<dyn Module>>; 12],
    request_transforms: Vec<Arc<dyn RequestTransform>>,
    response_transforms: Vec<Arc<dyn ResponseTransform>>,
    validate_http_method: bool,
    error_response_criteria: Vec<Arc<dyn ResponseCriterion>>,
    logging: LoggingConfig,
}

/// Applied in registration order by the `RequestTransformation` group.
pub trait RequestTransform: Send + Sync {
    fn transform(&self, request: &mut Request);
}

/// Applied in registration order by the `ResponseTransformation` group.
pub trait ResponseTransform: Send + Sync {
    fn transform(&self, response: &mut Response);
}

impl PipelineBuilder {
    pub fn new(validate_http_method: bool) -> Self {
        PipelineBuilder {
            groups: Default::default(),
            request_transforms: Vec::new(),
            response_transforms: Vec::new(),
            validate_http_method,
            error_response_criteria: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }

    /// Which of the Logging module's events actually fire
    /// (`LoggingConfig::log_request_details` / `log_result_details`).
    pub fn logging(&mut self, logging: LoggingConfig) -> &mut Self {
        self.logging = logging;
        self
    }

    pub fn register(&mut self, group: ModuleGroup, module: Arc<dyn Module>) -> &mut Self {
        self.groups[group.ordinal()].push(module);
        self
    }

    pub fn register_request_transform(&mut self, transform: Arc<dyn RequestTransform>) -> &mut Self {
        self.request_transforms.push(transform);
        self
    }

    pub fn register_response_transform(&mut self, transform: Arc<dyn ResponseTransform>) -> &mut Self {
        self.response_transforms.push(transform);
        self
    }

    /// Criteria used by the `Logging` module to choose Info/Warn/Error
    /// severity for the post-request event (`LoggingConfig::error_response_criteria`).
    pub fn error_response_criteria(&mut self, criteria: Vec<Arc<dyn ResponseCriterion>>) -> &mut Self {
        self.error_response_criteria = criteria;
        self
    }

    pub fn build(
        mut self,
        sender: Arc<RequestSender>,
        retry_policy: Arc<dyn RetryPolicy>,
        response_selector: Arc<dyn ResponseSelector>,
        deduplicate_request_url: bool,
        max_weight: f64,
    ) -> Pipeline {
        self.register(ModuleGroup::LeakPrevention, Arc::new(LeakPreventionModule));
        self.register(ModuleGroup::GlobalErrorHandling, Arc::new(GlobalErrorHandlingModule));
        self.register(
            ModuleGroup::RequestTransformation,
            Arc::new(RequestTransformationModule {
                transforms: std::mem::take(&mut self.request_transforms),
            }),
        );
        self.register(ModuleGroup::Priority, Arc::new(PriorityModule));
        self.register(
            ModuleGroup::Logging,
            Arc::new(LoggingModule {
                error_response_criteria: std::mem::take(&mut self.error_response_criteria),
                log_request_details: self.logging.log_request_details,
                log_result_details: self.logging.log_result_details,
            }),
        );
        self.register(
            ModuleGroup::ResponseTransformation,
            Arc::new(ResponseTransformationModule {
                transforms: std::mem::take(&mut self.response_transforms),
            }),
        );
        self.register(ModuleGroup::RequestErrorHandling, Arc::new(RequestErrorHandlingModule));
        self.register(ModuleGroup::RequestValidation, Arc::new(RequestValidationModule));
        if self.validate_http_method {
            self.register(ModuleGroup::RequestValidation, Arc::new(HttpMethodValidationModule));
        }
        self.register(ModuleGroup::TimeoutValidation, Arc::new(TimeoutValidationModule));
        self.register(ModuleGroup::Retry, Arc::new(RetryModule { policy: retry_policy }));
        self.register(
            ModuleGroup::Execution,
            Arc::new(ExecutionModule {
                sender,
                response_selector,
                deduplicate_request_url,
                max_weight,
            }),
        );

        let modules = self.groups.into_iter().flatten().collect();
        Pipeline { modules }
    }
}

/// Wraps the whole remaining pipeline; bails out early if the request was
/// already canceled before entering it.
struct LeakPreventionModule;

#[async_trait]
impl Module for LeakPreventionModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        if ctx.cancel.is_canceled() {
            return ClusterResult::terminal(ctx.request_id, ClusterResultStatus::Canceled, ctx.request.clone());
        }
        next.run(ctx).await
    }
}

/// Catches a panic anywhere in the remainder of the pipeline and converts it
/// to `UnexpectedException` rather than letting it cross the top of the
/// pipeline (spec §7 kind 6).
struct GlobalErrorHandlingModule;

#[async_trait]
impl Module for GlobalErrorHandlingModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&panic);
                error!(error = %message, "unexpected exception escaped the pipeline");
                ClusterResult::terminal(ctx.request_id, ClusterResultStatus::UnexpectedException, ctx.request.clone())
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct RequestTransformationModule {
    transforms: Vec<Arc<dyn RequestTransform>>,
}

#[async_trait]
impl Module for RequestTransformationModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        for transform in &self.transforms {
            transform.transform(&mut ctx.request);
        }
        next.run(ctx).await
    }
}

struct PriorityModule;

#[async_trait]
impl Module for PriorityModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        ctx.log.record("priority", ctx.parameters.priority);
        next.run(ctx).await
    }
}

struct LoggingModule {
    error_response_criteria: Vec<Arc<dyn ResponseCriterion>>,
    log_request_details: bool,
    log_result_details: bool,
}

impl LoggingModule {
    fn severity_for(&self, result: &ClusterResult) -> Level {
        if result.is_success() {
            return Level::INFO;
        }
        for criterion in &self.error_response_criteria {
            if criterion.classify(&result.selected) == crate::response::Verdict::Reject {
                return Level::ERROR;
            }
        }
        Level::WARN
    }
}

#[async_trait]
impl Module for LoggingModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        let _entered = ctx.log.clone().entered();
        if self.log_request_details {
            info!(target = %ctx.request.target, "dispatching logical request");
        }
        let result = next.run(ctx).await;
        if self.log_result_details {
            match self.severity_for(&result) {
                Level::ERROR => error!(status = ?result.status, attempts = result.replica_results.len(), "logical request failed"),
                Level::WARN => warn!(status = ?result.status, attempts = result.replica_results.len(), "logical request completed with a degraded outcome"),
                _ => info!(status = ?result.status, attempts = result.replica_results.len(), "logical request completed"),
            }
        }
        result
    }
}

struct ResponseTransformationModule {
    transforms: Vec<Arc<dyn ResponseTransform>>,
}

#[async_trait]
impl Module for ResponseTransformationModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        let mut result = next.run(ctx).await;
        for transform in &self.transforms {
            transform.transform(&mut result.selected);
        }
        result
    }
}

/// Narrower observability layer than `GlobalErrorHandling`: logs a
/// non-success outcome surfacing from validation/sending without itself
/// catching panics (that safety net already sits further out).
struct RequestErrorHandlingModule;

#[async_trait]
impl Module for RequestErrorHandlingModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        let result = next.run(ctx).await;
        if matches!(
            result.status,
            ClusterResultStatus::IncorrectArguments | ClusterResultStatus::UnexpectedException
        ) {
            warn!(status = ?result.status, "request did not reach normal execution");
        }
        result
    }
}

struct RequestValidationModule;

#[async_trait]
impl Module for RequestValidationModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        if ctx.request.target.trim().is_empty() {
            return ClusterResult::terminal(ctx.request_id, ClusterResultStatus::IncorrectArguments, ctx.request.clone());
        }
        if let Some(capability) = ctx.request.body.required_capability() {
            if !ctx.collaborators.transport.supports(capability) {
                return ClusterResult::terminal(ctx.request_id, ClusterResultStatus::IncorrectArguments, ctx.request.clone());
            }
        }
        if !ctx.request.body.is_concurrency_safe()
            && ctx.collaborators.config.strategy.requires_concurrency_safe_body()
        {
            return ClusterResult::terminal(ctx.request_id, ClusterResultStatus::IncorrectArguments, ctx.request.clone());
        }
        next.run(ctx).await
    }
}

struct HttpMethodValidationModule;

#[async_trait]
impl Module for HttpMethodValidationModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        // `Request::method` is already a closed enum, so every
        // value constructible in Rust is one of the enumerated methods;
        // this module is the extension point spec §6's `validateHttpMethod`
        // flag gates, for callers building a `Request` from a wire
        // representation with an open method space upstream of this type.
        next.run(ctx).await
    }
}

struct TimeoutValidationModule;

#[async_trait]
impl Module for TimeoutValidationModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        if ctx.budget.total().is_zero() {
            return ClusterResult::terminal(ctx.request_id, ClusterResultStatus::IncorrectArguments, ctx.request.clone());
        }
        next.run(ctx).await
    }
}

struct RetryModule {
    policy: Arc<dyn RetryPolicy>,
}

#[async_trait]
impl Module for RetryModule {
    async fn execute(&self, ctx: &mut RequestContext, next: Next<'_>) -> ClusterResult {
        let mut attempt = 0u32;
        let mut result = next.run(ctx).await;
        while !ctx.cancel.is_canceled() && self.policy.should_retry(attempt, &result) {
            attempt += 1;
            result = next.run(ctx).await;
        }
        result
    }
}

struct ExecutionModule {
    sender: Arc<RequestSender>,
    response_selector: Arc<dyn ResponseSelector>,
    deduplicate_request_url: bool,
    max_weight: f64,
}

#[async_trait]
impl Module for ExecutionModule {
    async fn execute(&self, ctx: &mut RequestContext, _next: Next<'_>) -> ClusterResult {
        let mut replicas = ctx.collaborators.cluster_provider.get_cluster();
        if self.deduplicate_request_url {
            replicas = dedupe(replicas);
        }
        if replicas.is_empty() {
            return ClusterResult::terminal(ctx.request_id, ClusterResultStatus::ReplicasNotFound, ctx.request.clone());
        }

        let cap = (ctx.max_replicas_used_per_request.max(0) as usize).min(replicas.len());
        let strategy_config = ctx.collaborators.config.strategy.clone();
        let connection_timeout = ctx.collaborators.config.connection_timeout;

        let mut ordering = ReplicaOrdering::new(
            &replicas,
            ctx.modifier_chain.as_ref(),
            &ctx.request,
            &ctx.parameters,
            self.max_weight,
        );

        let sctx = StrategyContext {
            sender: &self.sender,
            request: &ctx.request,
            budget: &ctx.budget,
            cancel: &ctx.cancel,
            accumulator: &ctx.accumulator,
            chain: ctx.modifier_chain.as_ref(),
            connection_timeout,
        };
        strategy::run(&sctx, &mut ordering, &strategy_config, cap).await;

        let results = ctx.accumulator.freeze();
        let selected = self.response_selector.select(&ctx.request, &ctx.parameters, &results);
        let status = select_status(&results, ctx.budget.has_expired(), ctx.cancel.is_canceled());

        ClusterResult {
            request_id: ctx.request_id,
            status,
            replica_results: results,
            selected,
            request: ctx.request.clone(),
        }
    }
}

/// Validates that a user-supplied module/transform list is non-empty
/// wherever the spec requires it (spec §6: "empty or null entries in any
/// user-supplied list" are rejected at configuration time).
pub fn validate_non_empty<T>(field: &'static str, items: &[T]) -> Result<()> {
    if items.is_empty() {
        Err(Error::EmptyList { field })
    } else {
        Ok(())
    }
}
