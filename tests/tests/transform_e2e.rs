//! Mid-run section transformation scenarios.

use std::sync::Arc;

use async_trait::async_trait;
use facet_engine::AnalysisEngine;
use facet_kernel::{
    AnalysisPlugin, DimensionContext, DimensionSpec, EngineConfig, PluginResult, Provider,
    ProviderRegistry, ProviderRequest, ProviderSelection, Section, TransformContext,
};
use facet_testing::{MockProvider, ScenarioPlugin};
use serde_json::json;

/// Global `split` rewrites "a. b. c" into three sections through the
/// `transform_sections` hook; section `analyze` then runs per piece.
struct SplitPlugin;

#[async_trait]
impl AnalysisPlugin for SplitPlugin {
    fn name(&self) -> &str {
        "split"
    }

    fn dimensions(&self) -> Vec<DimensionSpec> {
        vec![
            DimensionSpec::new("split").global(),
            DimensionSpec::new("analyze"),
        ]
    }

    async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest> {
        Ok(ProviderRequest::new(
            &ctx.dimension,
            json!({ "content": ctx.section.as_ref().map(|s| s.content.clone()) }),
        ))
    }

    fn select_provider(&self, _dimension: &str) -> ProviderSelection {
        ProviderSelection::new("mock")
    }

    async fn transform_sections(
        &self,
        ctx: &TransformContext,
    ) -> PluginResult<Option<Vec<Section>>> {
        if ctx.dimension != "split" {
            return Ok(None);
        }
        let pieces: Vec<Section> = ctx
            .sections
            .iter()
            .flat_map(|section| section.content.split(". "))
            .map(Section::new)
            .collect();
        Ok(Some(pieces))
    }
}

#[tokio::test]
async fn global_transform_rewrites_sections_mid_run() {
    let provider = MockProvider::succeeding("mock");
    let engine = AnalysisEngine::new(
        Arc::new(SplitPlugin),
        ProviderRegistry::from_providers([provider.clone() as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("a. b. c")]).await.unwrap();

    // The transform replaced one section with three; analyze ran per piece.
    assert_eq!(result.transformed_sections.len(), 3);
    assert_eq!(result.sections.len(), 3);
    let contents: Vec<&str> = result
        .sections
        .iter()
        .map(|outcome| outcome.section.content.as_str())
        .collect();
    assert_eq!(contents, vec!["a", "b", "c"]);

    // split once, analyze three times
    assert_eq!(provider.call_count(), 4);
    for outcome in &result.sections {
        assert!(outcome.results.contains_key("analyze"));
        // Fresh result slots: nothing from before the transform survives.
        assert_eq!(outcome.results.len(), 1);
    }
}

#[tokio::test]
async fn reverse_twice_restores_original_order() {
    fn reversing(name: &str) -> DimensionSpec {
        DimensionSpec::new(name)
            .global()
            .with_transform(|_result, sections| {
                Some(sections.iter().rev().cloned().collect())
            })
    }

    let plugin = ScenarioPlugin::new("reverser")
        .with_dimension(reversing("flip"))
        .with_dimension(reversing("flop").depends_on(["flip"]));
    let engine = AnalysisEngine::new(
        Arc::new(plugin),
        ProviderRegistry::from_providers([MockProvider::succeeding("mock") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    let result = engine
        .process(vec![
            Section::new("first"),
            Section::new("second"),
            Section::new("third"),
        ])
        .await
        .unwrap();

    let contents: Vec<&str> = result
        .transformed_sections
        .iter()
        .map(|section| section.content.as_str())
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn sections_added_by_pre_process_hook_are_used() {
    struct SeedingPlugin;

    #[async_trait]
    impl AnalysisPlugin for SeedingPlugin {
        fn name(&self) -> &str {
            "seeding"
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

        async fn before_process_start(
            &self,
            _ctx: &facet_kernel::ProcessContext,
        ) -> PluginResult<Option<facet_kernel::ProcessSeed>> {
            Ok(Some(facet_kernel::ProcessSeed {
                sections: Some(vec![Section::new("seeded-1"), Section::new("seeded-2")]),
                metadata: Some(json!({ "origin": "hook" })),
            }))
        }
    }

    let provider = MockProvider::succeeding("mock");
    let engine = AnalysisEngine::new(
        Arc::new(SeedingPlugin),
        ProviderRegistry::from_providers([provider.clone() as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    // Even with no input sections, the hook's replacement list is used.
    let result = engine.process(Vec::new()).await.unwrap();
    assert_eq!(result.sections.len(), 2);
    assert_eq!(provider.call_count(), 2);
    assert_eq!(result.metadata.unwrap()["origin"], "hook");
}
