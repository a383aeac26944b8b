//! Hook dispatch.
//!
//! Every optional plugin hook is invoked through this dispatcher, which
//! applies one uniform policy. *Advisory* hooks (observers, skip predicates,
//! rewrite/steering hooks, fallback suppliers) have their errors contained:
//! logged, reported to the plugin's `on_error` observer, and replaced by the
//! documented fallback so the run proceeds. *Structural* hooks
//! (`before_process_start`, `define_dependencies`, `finalize_results`)
//! re-raise, and `handle_process_failure` errors rethrow the original
//! process error.

use std::collections::HashMap;
use std::sync::Arc;

use facet_kernel::{
    AnalysisPlugin, CompletionContext, DependencyMap, DimensionContext, DimensionResult,
    EngineError, EngineResult, FallbackContext, FallbackDirective, FinalizeContext, PluginResult,
    ProcessContext, ProcessResult, ProcessSeed, ProviderRequest, ProviderResponse,
    ProviderSelection, RetryContext, RetryDirective, Section, SkipDecision, TransformContext,
};
use tracing::warn;

/// Uniform wrapper over the plugin's hooks.
#[derive(Clone)]
pub struct HookDispatcher {
    plugin: Arc<dyn AnalysisPlugin>,
}

impl HookDispatcher {
    pub fn new(plugin: Arc<dyn AnalysisPlugin>) -> Self {
        Self { plugin }
    }

    pub fn plugin(&self) -> &Arc<dyn AnalysisPlugin> {
        &self.plugin
    }

    /// Containment for advisory hooks: on error, log, notify `on_error`,
    /// return the documented fallback.
    fn contain<T>(&self, hook: &str, fallback: T, outcome: PluginResult<T>) -> T {
        match outcome {
            Ok(value) => value,
            Err(err) => {
                warn!(hook, error = %format!("{err:#}"), "advisory hook failed; using fallback");
                self.plugin.on_error(hook, &err);
                fallback
            }
        }
    }

    // ---- required plugin methods (errors propagate) ----

    pub async fn create_prompt(&self, ctx: &DimensionContext) -> EngineResult<ProviderRequest> {
        self.plugin
            .create_prompt(ctx)
            .await
            .map_err(EngineError::from)
    }

    pub fn select_provider(&self, dimension: &str) -> ProviderSelection {
        self.plugin.select_provider(dimension)
    }

    // ---- structural hooks (re-raise) ----

    pub async fn before_process_start(
        &self,
        ctx: &ProcessContext,
    ) -> EngineResult<Option<ProcessSeed>> {
        self.plugin
            .before_process_start(ctx)
            .await
            .map_err(EngineError::from)
    }

    pub fn define_dependencies(&self) -> EngineResult<HashMap<String, Vec<String>>> {
        self.plugin
            .define_dependencies()
            .map_err(EngineError::from)
    }

    pub async fn finalize_results(
        &self,
        ctx: &FinalizeContext,
    ) -> EngineResult<Option<HashMap<String, DimensionResult>>> {
        self.plugin
            .finalize_results(ctx)
            .await
            .map_err(EngineError::from)
    }

    // ---- advisory hooks (contained) ----

    pub async fn should_skip_global_dimension(&self, ctx: &DimensionContext) -> SkipDecision {
        let outcome = self.plugin.should_skip_global_dimension(ctx).await;
        self.contain("should_skip_global_dimension", SkipDecision::Run, outcome)
    }

    pub async fn should_skip_section_dimension(&self, ctx: &DimensionContext) -> SkipDecision {
        let outcome = self.plugin.should_skip_section_dimension(ctx).await;
        self.contain("should_skip_section_dimension", SkipDecision::Run, outcome)
    }

    pub async fn transform_dependencies(
        &self,
        ctx: &DimensionContext,
        deps: DependencyMap,
    ) -> DependencyMap {
        let fallback = deps.clone();
        let outcome = self.plugin.transform_dependencies(ctx, deps).await;
        self.contain("transform_dependencies", fallback, outcome)
    }

    pub async fn before_dimension_execute(&self, ctx: &DimensionContext) {
        let outcome = self.plugin.before_dimension_execute(ctx).await;
        self.contain("before_dimension_execute", (), outcome);
    }

    pub async fn before_provider_execute(
        &self,
        ctx: &DimensionContext,
        request: ProviderRequest,
    ) -> ProviderRequest {
        let fallback = request.clone();
        let outcome = self.plugin.before_provider_execute(ctx, request).await;
        self.contain("before_provider_execute", fallback, outcome)
    }

    pub async fn handle_retry(&self, ctx: &RetryContext) -> RetryDirective {
        let outcome = self.plugin.handle_retry(ctx).await;
        self.contain("handle_retry", RetryDirective::default(), outcome)
    }

    pub async fn handle_provider_fallback(&self, ctx: &FallbackContext) -> FallbackDirective {
        let outcome = self.plugin.handle_provider_fallback(ctx).await;
        self.contain(
            "handle_provider_fallback",
            FallbackDirective::default(),
            outcome,
        )
    }

    pub async fn after_provider_execute(
        &self,
        ctx: &DimensionContext,
        response: ProviderResponse,
    ) -> ProviderResponse {
        let fallback = response.clone();
        let outcome = self.plugin.after_provider_execute(ctx, response).await;
        self.contain("after_provider_execute", fallback, outcome)
    }

    pub async fn after_dimension_execute(&self, ctx: &DimensionContext, result: &DimensionResult) {
        let outcome = self.plugin.after_dimension_execute(ctx, result).await;
        self.contain("after_dimension_execute", (), outcome);
    }

    pub async fn handle_dimension_failure(
        &self,
        ctx: &DimensionContext,
        error: &EngineError,
    ) -> Option<DimensionResult> {
        let outcome = self.plugin.handle_dimension_failure(ctx, error).await;
        self.contain("handle_dimension_failure", None, outcome)
    }

    pub async fn transform_sections(&self, ctx: &TransformContext) -> Option<Vec<Section>> {
        let outcome = self.plugin.transform_sections(ctx).await;
        self.contain("transform_sections", None, outcome)
    }

    pub async fn after_process_complete(
        &self,
        ctx: &CompletionContext,
        result: ProcessResult,
    ) -> ProcessResult {
        let fallback = result.clone();
        let outcome = self.plugin.after_process_complete(ctx, result).await;
        self.contain("after_process_complete", fallback, outcome)
    }

    /// Errors here rethrow the original process error, so the fallback is
    /// `None` ("no recovery").
    pub async fn handle_process_failure(
        &self,
        error: &EngineError,
        partial: &ProcessResult,
    ) -> Option<ProcessResult> {
        let outcome = self.plugin.handle_process_failure(error, partial).await;
        self.contain("handle_process_failure", None, outcome)
    }
}
