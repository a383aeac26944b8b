//! Cross-scope dependency resolution scenarios.

use std::sync::Arc;

use facet_engine::AnalysisEngine;
use facet_kernel::{
    has_failed_dependencies, DimensionSpec, EngineConfig, Provider, ProviderRegistry,
    ProviderSelection, Section,
};
use facet_testing::{EchoProvider, MockProvider, ScenarioPlugin};
use serde_json::json;

#[tokio::test]
async fn global_consumer_receives_aggregated_section_results() {
    // `score` produces { value: i } per section; `pick` consumes the
    // engine-owned aggregation envelope.
    let plugin = Arc::new(
        ScenarioPlugin::new("aggregation")
            .with_dimension(DimensionSpec::new("score"))
            .with_dimension(DimensionSpec::new("pick").global().depends_on(["score"]))
            .with_default_selection(ProviderSelection::new("echo"))
            .with_prompt_fn(|ctx| match ctx.section_index {
                Some(index) => json!({ "value": index }),
                None => json!({ "picking": true }),
            }),
    );
    let engine = AnalysisEngine::new(
        plugin.clone(),
        ProviderRegistry::from_providers([EchoProvider::new("echo") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    engine
        .process(vec![
            Section::new("s0"),
            Section::new("s1"),
            Section::new("s2"),
        ])
        .await
        .unwrap();

    let pick_ctx = &plugin.prompt_contexts_for("pick")[0];
    let aggregated = pick_ctx.dependencies["score"].data.as_ref().unwrap();
    assert_eq!(aggregated["aggregated"], true);
    assert_eq!(aggregated["totalSections"], 3);
    let sections = aggregated["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 3);
    for (index, entry) in sections.iter().enumerate() {
        assert_eq!(entry["data"]["value"], index);
    }
}

#[tokio::test]
async fn section_consumer_receives_global_result_verbatim() {
    let plugin = Arc::new(
        ScenarioPlugin::new("downward")
            .with_dimension(DimensionSpec::new("theme").global())
            .with_dimension(DimensionSpec::new("analyze").depends_on(["theme"]))
            .with_default_selection(ProviderSelection::new("echo"))
            .with_prompt_fn(|ctx| json!({ "dimension": ctx.dimension })),
    );
    let engine = AnalysisEngine::new(
        plugin.clone(),
        ProviderRegistry::from_providers([EchoProvider::new("echo") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    engine
        .process(vec![Section::new("s0"), Section::new("s1")])
        .await
        .unwrap();

    let contexts = plugin.prompt_contexts_for("analyze");
    assert_eq!(contexts.len(), 2);
    for ctx in &contexts {
        assert_eq!(
            ctx.dependencies["theme"].data.as_ref().unwrap()["dimension"],
            "theme"
        );
    }
}

#[tokio::test]
async fn failed_dependency_is_data_not_an_exception() {
    // `first` always fails; `second` still executes and sees the error
    // entry in its dependency map.
    let plugin = Arc::new(
        ScenarioPlugin::new("failed-deps")
            .with_dimension(DimensionSpec::new("first"))
            .with_dimension(DimensionSpec::new("second").depends_on(["first"]))
            .with_selection("first", ProviderSelection::new("bad"))
            .with_selection("second", ProviderSelection::new("good")),
    );
    let bad = MockProvider::failing("bad", "always down");
    let good = MockProvider::succeeding("good");
    let engine = AnalysisEngine::new(
        plugin.clone(),
        ProviderRegistry::from_providers([
            bad as Arc<dyn Provider>,
            good.clone() as Arc<dyn Provider>,
        ]),
        EngineConfig::new().with_max_retries(0),
    )
    .unwrap();

    let result = engine.process(vec![Section::new("body")]).await.unwrap();

    assert!(result.sections[0].results["first"].is_error());
    assert!(result.sections[0].results["second"].error.is_none());
    assert_eq!(good.call_count(), 1);

    let second_ctx = &plugin.prompt_contexts_for("second")[0];
    assert!(has_failed_dependencies(&second_ctx.dependencies));
    assert!(second_ctx.dependencies["first"].is_error());
}

#[tokio::test]
async fn transform_dependencies_hook_rewrites_the_map() {
    use async_trait::async_trait;
    use facet_kernel::{
        AnalysisPlugin, DependencyMap, DimensionContext, DimensionResult, PluginResult,
        ProviderRequest,
    };
    use std::sync::Mutex;

    struct RewritingPlugin {
        seen: Mutex<Vec<DependencyMap>>,
    }

    #[async_trait]
    impl AnalysisPlugin for RewritingPlugin {
        fn name(&self) -> &str {
            "rewriting"
        }

        fn dimensions(&self) -> Vec<DimensionSpec> {
            vec![
                DimensionSpec::new("base"),
                DimensionSpec::new("derived").depends_on(["base"]),
            ]
        }

        async fn create_prompt(&self, ctx: &DimensionContext) -> PluginResult<ProviderRequest> {
            if ctx.dimension == "derived" {
                self.seen
                    .lock()
                    .expect("seen poisoned")
                    .push(ctx.dependencies.clone());
            }
            Ok(ProviderRequest::new(&ctx.dimension, json!("p")))
        }

        fn select_provider(&self, _dimension: &str) -> ProviderSelection {
            ProviderSelection::new("mock")
        }

        async fn transform_dependencies(
            &self,
            ctx: &DimensionContext,
            mut deps: DependencyMap,
        ) -> PluginResult<DependencyMap> {
            if ctx.dimension == "derived" {
                deps.insert(
                    "injected".to_string(),
                    DimensionResult::ok(json!("synthetic")),
                );
            }
            Ok(deps)
        }
    }

    let plugin = Arc::new(RewritingPlugin {
        seen: Mutex::new(Vec::new()),
    });
    let engine = AnalysisEngine::new(
        plugin.clone(),
        ProviderRegistry::from_providers([MockProvider::succeeding("mock") as Arc<dyn Provider>]),
        EngineConfig::new(),
    )
    .unwrap();

    engine.process(vec![Section::new("body")]).await.unwrap();

    let seen = plugin.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains_key("base"));
    assert_eq!(
        seen[0]["injected"].data.as_ref().unwrap(),
        &json!("synthetic")
    );
}
