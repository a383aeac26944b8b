//! Failure recovery, skip decisions, and the continue-on-error policy.

use std::sync::Arc;

use async_trait::async_trait;
use facet_engine::AnalysisEngine;
use facet_kernel::{
    AnalysisPlugin, DimensionContext, DimensionResult, DimensionSpec, EngineConfig, EngineError,
    PluginResult, ProcessResult, Provider, ProviderRegistry, ProviderRequest, ProviderSelection,
    Section, SkipDecision,
};
use facet_testing::{MockProvider, ScenarioPlugin};
use serde_json::json;

/// Plugin whose `handle_dimension_failure` supplies a neutral fallback.
struct NeutralFallbackPlugin;

#[async_trait]
impl AnalysisPlugin for NeutralFallbackPlugin {
    fn name(&self) -> &str {
        "neutral-fallback"
    }

    fn dimensions(&self) -> Vec<DimensionSpec> {
        vec!["analyze".into()]
    }

    async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest> {
        Ok(ProviderRequest::new(&ctx.dimension, json!("p")))
    }

    fn select_provider(&self, _dimension: &str) -> ProviderSelection {
        ProviderSelection::new("bad")
    }

    async fn handle_dimension_failure(
        &self,
        _ctx: &DimensionContext,
        _error: &EngineError,
    ) -> PluginResult<Option<DimensionResult>> {
        Ok(Some(DimensionResult::ok(json!({ "sentiment": "neutral" }))))
    }
}

#[tokio::test]
async fn dimension_failure_handler_supplies_fallback_result() {
    let provider = MockProvider::failing("bad", "always down");
    let engine = AnalysisEngine::new(
        Arc::new(NeutralFallbackPlugin),
        ProviderRegistry::from_providers([provider as Arc<dyn Provider>]),
        EngineConfig::new().with_max_retries(0),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();

    let entry = &result.sections[0].results["analyze"];
    assert!(entry.error.is_none());
    assert_eq!(entry.data.as_ref().unwrap()["sentiment"], "neutral");
    assert_eq!(entry.metadata.as_ref().unwrap().fallback, Some(true));
}

#[tokio::test]
async fn continue_on_error_records_error_results() {
    let plugin = ScenarioPlugin::new("lenient")
        .with_dimension("broken")
        .with_dimension("healthy")
        .with_selection("broken", ProviderSelection::new("bad"))
        .with_selection("healthy", ProviderSelection::new("good"));
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([
            MockProvider::failing("bad", "boom") as Arc<dyn Provider>,
            MockProvider::succeeding("good") as Arc<dyn Provider>,
        ]),
        EngineConfig::new().with_max_retries(0),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();

    assert!(result.sections[0].results["broken"].is_error());
    assert!(result.sections[0].results["healthy"].error.is_none());
    assert_eq!(result.failure_count(), 1);
}

#[tokio::test]
async fn strict_mode_surfaces_the_first_failure() {
    let plugin = ScenarioPlugin::new("strict")
        .with_dimension("broken")
        .with_selection("broken", ProviderSelection::new("bad"));
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([
            MockProvider::failing("bad", "boom") as Arc<dyn Provider>,
        ]),
        EngineConfig::new()
            .with_max_retries(0)
            .with_continue_on_error(false),
    )
    .unwrap();

    let err = engine.process(vec![Section::new("body")]).await.unwrap_err();
    assert_eq!(err.kind(), "AllProvidersFailed");
}

#[tokio::test]
async fn strict_mode_lets_siblings_finish_before_surfacing() {
    let plugin = ScenarioPlugin::new("siblings")
        .with_dimension("broken")
        .with_dimension("healthy")
        .with_selection("broken", ProviderSelection::new("bad"))
        .with_selection("healthy", ProviderSelection::new("good"));
    let good = MockProvider::succeeding("good");
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([
            MockProvider::failing("bad", "boom") as Arc<dyn Provider>,
            good.clone() as Arc<dyn Provider>,
        ]),
        EngineConfig::new()
            .with_max_retries(0)
            .with_continue_on_error(false),
    )
    .unwrap();

    let err = engine
        .process(vec![Section::new("s0"), Section::new("s1")])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "AllProvidersFailed");
    // Sibling tasks were not cancelled: healthy ran on both sections.
    assert_eq!(good.call_count(), 2);
}

/// Plugin recovering a failed run by surfacing the partial result.
struct PartialRecoveryPlugin;

#[async_trait]
impl AnalysisPlugin for PartialRecoveryPlugin {
    fn name(&self) -> &str {
        "partial-recovery"
    }

    fn dimensions(&self) -> Vec<DimensionSpec> {
        vec!["broken".into(), "healthy".into()]
    }

    async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest> {
        Ok(ProviderRequest::new(&ctx.dimension, json!("p")))
    }

    fn select_provider(&self, dimension: &str) -> ProviderSelection {
        match dimension {
            "broken" => ProviderSelection::new("bad"),
            _ => ProviderSelection::new("good"),
        }
    }

    async fn handle_process_failure(
        &self,
        _error: &EngineError,
        partial: &ProcessResult,
    ) -> PluginResult<Option<ProcessResult>> {
        Ok(Some(partial.clone()))
    }
}

#[tokio::test]
async fn process_failure_handler_can_surface_the_partial_result() {
    let engine = AnalysisEngine::new(
        Arc::new(PartialRecoveryPlugin),
        ProviderRegistry::from_providers([
            MockProvider::failing("bad", "boom") as Arc<dyn Provider>,
            MockProvider::succeeding("good") as Arc<dyn Provider>,
        ]),
        EngineConfig::new()
            .with_max_retries(0)
            .with_continue_on_error(false),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();

    // The failing dimension's outcome is in the recovered partial result.
    assert!(result.sections[0].results["broken"].is_error());
    assert!(result.sections[0].results["healthy"].error.is_none());
}

/// Plugin skipping one section dimension and one global dimension.
struct SkippingPlugin;

#[async_trait]
impl AnalysisPlugin for SkippingPlugin {
    fn name(&self) -> &str {
        "skipping"
    }

    fn dimensions(&self) -> Vec<DimensionSpec> {
        vec![
            DimensionSpec::new("analyze"),
            DimensionSpec::new("overview").global(),
        ]
    }

    async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest> {
        Ok(ProviderRequest::new(&ctx.dimension, json!("p")))
    }

    fn select_provider(&self, _dimension: &str) -> ProviderSelection {
        ProviderSelection::new("mock")
    }

    async fn should_skip_section_dimension(
        &self,
        _ctx: &DimensionContext,
    ) -> PluginResult<SkipDecision> {
        Ok(SkipDecision::skip())
    }

    async fn should_skip_global_dimension(
        &self,
        _ctx: &DimensionContext,
    ) -> PluginResult<SkipDecision> {
        Ok(SkipDecision::skip_because("cached elsewhere"))
    }
}

#[tokio::test]
async fn skipped_dimensions_carry_the_marker_in_metadata() {
    let provider = MockProvider::succeeding("mock");
    let engine = AnalysisEngine::new(
        Arc::new(SkippingPlugin),
        ProviderRegistry::from_providers([provider.clone() as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();

    // No provider call happened at all.
    assert_eq!(provider.call_count(), 0);

    // Section skip: marker in metadata only, data unset.
    let section_entry = &result.sections[0].results["analyze"];
    assert!(section_entry.data.is_none());
    assert!(section_entry.is_skipped());
    assert_eq!(
        section_entry.metadata.as_ref().unwrap().reason.as_deref(),
        Some("Skipped by plugin logic")
    );

    // Global skip: marker in both data and metadata.
    let global_entry = &result.global_results["overview"];
    assert_eq!(global_entry.data.as_ref().unwrap()["skipped"], true);
    assert!(global_entry.is_skipped());
    assert_eq!(
        global_entry.metadata.as_ref().unwrap().reason.as_deref(),
        Some("cached elsewhere")
    );
}
