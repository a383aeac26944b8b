//! Finalize, post-process, cost accounting, and the event stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use facet_engine::{AnalysisEngine, Phase, ProcessEvent};
use facet_kernel::{
    AnalysisPlugin, CompletionContext, DimensionContext, DimensionResult, DimensionSpec,
    EngineConfig, FinalizeContext, InMemoryPricingRegistry, ModelPricing, PluginResult,
    ProcessResult, Provider, ProviderRegistry, ProviderRequest, ProviderSelection, Section,
    SharedPricingRegistry,
};
use facet_testing::{MockProvider, ScenarioPlugin};
use serde_json::json;

/// Plugin that rewrites results in finalize and annotates the final result.
struct FinalizingPlugin;

#[async_trait]
impl AnalysisPlugin for FinalizingPlugin {
    fn name(&self) -> &str {
        "finalizing"
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

    async fn finalize_results(
        &self,
        ctx: &FinalizeContext,
    ) -> PluginResult<Option<HashMap<String, DimensionResult>>> {
        // The flat view carries both key shapes.
        assert!(ctx.results.contains_key("overview"));
        assert!(ctx.results.contains_key("analyze_section_0"));

        let mut replacement = HashMap::new();
        replacement.insert(
            "analyze_section_0".to_string(),
            DimensionResult::ok(json!({ "finalized": true })),
        );
        replacement.insert(
            "overview".to_string(),
            DimensionResult::ok(json!({ "finalized": "global" })),
        );
        Ok(Some(replacement))
    }

    async fn after_process_complete(
        &self,
        ctx: &CompletionContext,
        mut result: ProcessResult,
    ) -> PluginResult<ProcessResult> {
        assert!(ctx.summary.total_dimensions > 0);
        result.metadata = Some(json!({ "post": "processed" }));
        Ok(result)
    }
}

#[tokio::test]
async fn finalize_replacement_merges_into_both_scopes() {
    let engine = AnalysisEngine::new(
        Arc::new(FinalizingPlugin),
        ProviderRegistry::from_providers([MockProvider::succeeding("mock") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();

    assert_eq!(
        result.sections[0].results["analyze"].data.as_ref().unwrap()["finalized"],
        true
    );
    assert_eq!(
        result.global_results["overview"].data.as_ref().unwrap()["finalized"],
        "global"
    );
    assert_eq!(result.metadata.unwrap()["post"], "processed");
}

#[tokio::test]
async fn cost_summary_rolls_up_token_usage() {
    // The mock's default response reports model "mock-model" with 10 input
    // and 5 output tokens per call.
    let pricing: SharedPricingRegistry = Arc::new(
        InMemoryPricingRegistry::new().with_pricing(
            "mock",
            "mock-model",
            ModelPricing::new(1.0, 2.0),
        ),
    );
    let plugin = ScenarioPlugin::new("costed").with_dimension("analyze");
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([MockProvider::succeeding("mock") as Arc<dyn Provider>]),
        EngineConfig::new().with_pricing(pricing),
    )
    .unwrap();

    let result = engine
        .process(vec![Section::new("one"), Section::new("two")])
        .await
        .unwrap();

    let costs = result.costs.unwrap();
    assert_eq!(costs.total_tokens, 2 * 15);
    // Per call: 10/1000 * 1.0 + 5/1000 * 2.0 = 0.02 USD.
    assert!((costs.total_cost - 0.04).abs() < 1e-9);
    assert!((costs.by_dimension["analyze"] - 0.04).abs() < 1e-9);
    assert!((costs.by_provider["mock"] - 0.04).abs() < 1e-9);
    assert_eq!(costs.currency, "USD");
}

#[tokio::test]
async fn no_pricing_registry_means_no_costs() {
    let plugin = ScenarioPlugin::new("uncosted").with_dimension("analyze");
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([MockProvider::succeeding("mock") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();
    assert!(result.costs.is_none());
}

#[tokio::test]
async fn event_stream_brackets_the_run() {
    let plugin = ScenarioPlugin::new("observed")
        .with_dimension("analyze")
        .with_dimension(DimensionSpec::new("overview").global());
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([MockProvider::succeeding("mock") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap()
    .with_event_sender(tx);

    engine.process(vec![Section::new("body")]).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(ProcessEvent::ProcessStarted { .. })));
    assert!(matches!(events.last(), Some(ProcessEvent::ProcessCompleted { .. })));

    let phases: Vec<Phase> = events
        .iter()
        .filter_map(|event| match event {
            ProcessEvent::PhaseStarted { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            Phase::PreProcess,
            Phase::Plan,
            Phase::Execute,
            Phase::Finalize,
            Phase::PostProcess
        ]
    );

    let started = events
        .iter()
        .filter(|event| matches!(event, ProcessEvent::DimensionStarted { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|event| matches!(event, ProcessEvent::DimensionCompleted { .. }))
        .count();
    assert_eq!(started, 2);
    assert_eq!(completed, 2);
}

#[tokio::test]
async fn advisory_hook_failures_do_not_stop_the_run() {
    struct NoisyPlugin;

    #[async_trait]
    impl AnalysisPlugin for NoisyPlugin {
        fn name(&self) -> &str {
            "noisy"
        }

        fn dimensions(&self) -> Vec<DimensionSpec> {
            vec!["analyze".into()]
        }

        async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest> {
            Ok(ProviderRequest::new(&ctx.dimension, json!("p")))
        }

        fn select_provider(&self, _dimension: &str) -> ProviderSelection {
            ProviderSelection::new("mock")
        }

        async fn before_dimension_execute(&self, _ctx: &DimensionContext) -> PluginResult<()> {
            anyhow::bail!("observer exploded")
        }

        async fn after_dimension_execute(
            &self,
            _ctx: &DimensionContext,
            _result: &DimensionResult,
        ) -> PluginResult<()> {
            anyhow::bail!("observer exploded again")
        }
    }

    let provider = MockProvider::succeeding("mock");
    let engine = AnalysisEngine::new(
        Arc::new(NoisyPlugin),
        ProviderRegistry::from_providers([provider.clone() as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();
    assert_eq!(provider.call_count(), 1);
    assert!(result.sections[0].results["analyze"].error.is_none());
}
