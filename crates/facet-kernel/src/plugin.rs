//! Plugin contract.
//!
//! A plugin declares the analysis dimensions, builds provider requests, and
//! selects providers. Everything else (skip predicates, dependency rewrites,
//! retry/fallback steering, section transforms, result finalization, failure
//! recovery) is an optional hook expressed as a default trait method.
//!
//! Hooks return [`PluginResult`] (`anyhow::Result`): user code is free to
//! bubble up arbitrary errors with `?`. The engine's hook dispatcher decides
//! per hook whether an error is contained (advisory hooks) or re-raised
//! (structural hooks).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::dimension::{DependencyMap, DimensionResult, DimensionScope, DimensionSpec};
use crate::error::EngineError;
use crate::provider::{ProviderRequest, ProviderResponse, ProviderSelection};
use crate::result::{ProcessResult, ProcessSummary};
use crate::section::Section;

/// Result type returned by plugin hooks.
pub type PluginResult<T> = anyhow::Result<T>;

/// Default reason recorded when a skip hook returns no reason of its own.
pub const DEFAULT_SKIP_REASON: &str = "Skipped by plugin logic";

/// Context handed to `before_process_start`.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub process_id: String,
    pub sections: Vec<Section>,
    pub metadata: serde_json::Value,
}

/// Replacement inputs returned by `before_process_start`.
#[derive(Debug, Clone, Default)]
pub struct ProcessSeed {
    /// Replaces the run's section list when set.
    pub sections: Option<Vec<Section>>,
    /// Replaces the run's metadata when set.
    pub metadata: Option<serde_json::Value>,
}

/// Context for one dimension execution.
///
/// `section_index` and `section` are set for section-scope executions only.
#[derive(Debug, Clone)]
pub struct DimensionContext {
    pub process_id: String,
    pub dimension: String,
    pub scope: DimensionScope,
    pub section_index: Option<usize>,
    pub section: Option<Section>,
    /// Resolved dependency inputs (empty until resolution has run).
    pub dependencies: DependencyMap,
    /// Snapshot of the current section list.
    pub sections: Vec<Section>,
    /// Snapshot of the run metadata.
    pub metadata: serde_json::Value,
}

/// Outcome of a skip predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SkipDecision {
    /// Execute the dimension.
    #[default]
    Run,
    /// Skip the dimension, recording the reason in result metadata.
    Skip { reason: Option<String> },
}

impl SkipDecision {
    pub fn skip() -> Self {
        Self::Skip { reason: None }
    }

    pub fn skip_because(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: Some(reason.into()),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    /// The reason to record, substituting the default when none was given.
    pub fn reason(&self) -> &str {
        match self {
            Self::Skip {
                reason: Some(reason),
            } => reason,
            _ => DEFAULT_SKIP_REASON,
        }
    }
}

/// Context for `handle_retry`, after a failed provider attempt.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub dimension: String,
    /// 1-based attempt number that just failed.
    pub attempt: u32,
    pub error: String,
    pub request: ProviderRequest,
}

/// Steering returned by `handle_retry`.
#[derive(Debug, Clone, Default)]
pub struct RetryDirective {
    /// Replacement request for the next attempt.
    pub request: Option<ProviderRequest>,
    /// Veto further retries of the current provider.
    pub cancel: bool,
}

/// Context for `handle_provider_fallback`, after a selection is exhausted.
#[derive(Debug, Clone)]
pub struct FallbackContext {
    pub dimension: String,
    pub error: String,
    pub failed_provider: String,
    /// The next provider in the chain, when one remains.
    pub next_provider: Option<String>,
}

/// Steering returned by `handle_provider_fallback`.
#[derive(Debug, Clone, Default)]
pub struct FallbackDirective {
    /// Stop the fallback chain and surface the failure.
    pub cancel: bool,
}

/// Context for `transform_sections`, after a global dimension completes.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub process_id: String,
    pub dimension: String,
    pub result: DimensionResult,
    /// Current sections (already rewritten by a legacy transform, if any).
    pub sections: Vec<Section>,
    pub metadata: serde_json::Value,
}

/// Context for `finalize_results`.
///
/// `results` is the flat view: global results keyed by dimension name,
/// section results keyed `"<dimension>_section_<index>"`.
#[derive(Debug, Clone)]
pub struct FinalizeContext {
    pub process_id: String,
    pub results: HashMap<String, DimensionResult>,
    pub metadata: serde_json::Value,
}

/// Context for `after_process_complete`.
#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub process_id: String,
    pub summary: ProcessSummary,
    pub metadata: serde_json::Value,
}

/// User-supplied analysis plugin.
///
/// Required methods declare the dimensions and drive prompt/provider
/// construction; every other method is an optional lifecycle hook with a
/// no-op default. The engine awaits hooks uniformly and applies the
/// documented fallback when an advisory hook errors.
#[async_trait]
pub trait AnalysisPlugin: Send + Sync {
    /// Plugin name, used in logs and run metadata.
    fn name(&self) -> &str;

    /// The declared dimensions. Names must be unique.
    fn dimensions(&self) -> Vec<DimensionSpec>;

    /// Build the provider request for one dimension execution.
    async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest>;

    /// Choose the provider chain for a dimension.
    fn select_provider(&self, dimension: &str) -> ProviderSelection;

    // ---- Lifecycle hooks (optional) ----

    /// Phase 1. May replace the section list and seed run metadata.
    /// Structural: errors abort the run.
    async fn before_process_start(
        &self,
        _ctx: &ProcessContext,
    ) -> PluginResult<Option<ProcessSeed>> {
        Ok(None)
    }

    /// Phase 2. Additional dependency edges, unioned with the declarative
    /// `depends_on` lists. Structural: errors abort the run.
    fn define_dependencies(&self) -> PluginResult<HashMap<String, Vec<String>>> {
        Ok(HashMap::new())
    }

    /// Skip predicate for global dimensions. Errors mean "do not skip".
    async fn should_skip_global_dimension(
        &self,
        _ctx: &DimensionContext,
    ) -> PluginResult<SkipDecision> {
        Ok(SkipDecision::Run)
    }

    /// Skip predicate for section dimensions. Errors mean "do not skip".
    async fn should_skip_section_dimension(
        &self,
        _ctx: &DimensionContext,
    ) -> PluginResult<SkipDecision> {
        Ok(SkipDecision::Run)
    }

    /// Rewrite the resolved dependency map before prompt construction.
    /// Errors leave the dependencies unmodified.
    async fn transform_dependencies(
        &self,
        _ctx: &DimensionContext,
        deps: DependencyMap,
    ) -> PluginResult<DependencyMap> {
        Ok(deps)
    }

    /// Observer before a dimension executes. Errors are ignored.
    async fn before_dimension_execute(&self, _ctx: &DimensionContext) -> PluginResult<()> {
        Ok(())
    }

    /// Rewrite the request before each provider selection is tried.
    /// Errors leave the request unmodified.
    async fn before_provider_execute(
        &self,
        _ctx: &DimensionContext,
        request: ProviderRequest,
    ) -> PluginResult<ProviderRequest> {
        Ok(request)
    }

    /// Steering after a failed provider attempt. Errors mean "proceed with
    /// the default" (no replacement, keep retrying).
    async fn handle_retry(&self, _ctx: &RetryContext) -> PluginResult<RetryDirective> {
        Ok(RetryDirective::default())
    }

    /// Steering when a provider selection is exhausted and a fallback is
    /// about to be tried. Errors mean "continue the chain".
    async fn handle_provider_fallback(
        &self,
        _ctx: &FallbackContext,
    ) -> PluginResult<FallbackDirective> {
        Ok(FallbackDirective::default())
    }

    /// Rewrite the provider response. Errors keep the original response.
    async fn after_provider_execute(
        &self,
        _ctx: &DimensionContext,
        response: ProviderResponse,
    ) -> PluginResult<ProviderResponse> {
        Ok(response)
    }

    /// Observer after a dimension result is produced. Errors are ignored.
    async fn after_dimension_execute(
        &self,
        _ctx: &DimensionContext,
        _result: &DimensionResult,
    ) -> PluginResult<()> {
        Ok(())
    }

    /// Last-chance recovery when a dimension fails after all retries,
    /// fallbacks, and timeouts. A returned result is used in place of the
    /// failure and marked `metadata.fallback = true`. Errors (and `None`)
    /// surface the original failure.
    async fn handle_dimension_failure(
        &self,
        _ctx: &DimensionContext,
        _error: &EngineError,
    ) -> PluginResult<Option<DimensionResult>> {
        Ok(None)
    }

    /// Section rewrite after a global dimension completes. Runs after the
    /// declaration's legacy transform, over the already-transformed list.
    /// Errors mean "no transform".
    async fn transform_sections(
        &self,
        _ctx: &TransformContext,
    ) -> PluginResult<Option<Vec<Section>>> {
        Ok(None)
    }

    /// Phase 4. May return a replacement for the flat result view, merged
    /// back into the run state. Structural: errors abort (the execution
    /// phase has already completed).
    async fn finalize_results(
        &self,
        _ctx: &FinalizeContext,
    ) -> PluginResult<Option<HashMap<String, DimensionResult>>> {
        Ok(None)
    }

    /// Phase 5. May rewrite the final result. Errors keep the original.
    async fn after_process_complete(
        &self,
        _ctx: &CompletionContext,
        result: ProcessResult,
    ) -> PluginResult<ProcessResult> {
        Ok(result)
    }

    /// Recovery from a catastrophic (phase-level) failure. A returned result
    /// is surfaced to the caller; `None` or an error rethrows.
    async fn handle_process_failure(
        &self,
        _error: &EngineError,
        _partial: &ProcessResult,
    ) -> PluginResult<Option<ProcessResult>> {
        Ok(None)
    }

    /// Informational observer invoked whenever an advisory hook errors.
    /// Never influences control flow.
    fn on_error(&self, _context: &str, _error: &anyhow::Error) {}
}
