//! Phase orchestration.
//!
//! [`AnalysisEngine::process`] drives the five phases of one run:
//! pre-process -> plan -> execute -> finalize -> post-process. Any phase
//! error is routed through the failure path: a partial result is built from
//! whatever was written and offered to `handle_process_failure`; if the
//! plugin does not recover, the error is rethrown.

use std::collections::HashMap;
use std::sync::Arc;

use facet_kernel::{
    AnalysisPlugin, CompletionContext, DimensionResult, DimensionSpec, EngineConfig, EngineError,
    EngineResult, FinalizeContext, ProcessContext, ProcessResult, ProcessSummary, ProviderRegistry,
    Section, SectionOutcome, SharedPricingRegistry,
};
use facet_kernel::pricing::{CostSummary, PricingRegistry};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::dimension_exec::DimensionExecutor;
use crate::events::{EventEmitter, Phase, ProcessEvent};
use crate::graph::{split_group_by_scope, DependencyGraphManager, ExecutionPlan};
use crate::hooks::HookDispatcher;
use crate::provider_exec::ProviderExecutor;
use crate::state::ProcessState;
use crate::transform::TransformationManager;

/// Separator between a dimension name and its section index in the flat
/// finalize view.
const SECTION_KEY_INFIX: &str = "_section_";

/// The dimensional analysis engine.
pub struct AnalysisEngine {
    hooks: HookDispatcher,
    registry: ProviderRegistry,
    config: EngineConfig,
    event_sender: Option<mpsc::Sender<ProcessEvent>>,
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine").finish_non_exhaustive()
    }
}

impl AnalysisEngine {
    /// Construct an engine, failing fast on invalid configuration or an
    /// empty provider set.
    pub fn new(
        plugin: Arc<dyn AnalysisPlugin>,
        providers: ProviderRegistry,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        if providers.is_empty() {
            return Err(EngineError::NoProviders);
        }
        Ok(Self {
            hooks: HookDispatcher::new(plugin),
            registry: providers,
            config,
            event_sender: None,
        })
    }

    /// Attach an execution event observer.
    pub fn with_event_sender(mut self, sender: mpsc::Sender<ProcessEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Run the full five-phase pipeline over `sections`.
    pub async fn process(&self, sections: Vec<Section>) -> EngineResult<ProcessResult> {
        let state = Arc::new(ProcessState::new(sections));
        let events = EventEmitter::new(self.event_sender.clone());

        events
            .emit(ProcessEvent::ProcessStarted {
                process_id: state.id.clone(),
                section_count: state.section_count().await,
            })
            .await;
        info!(process_id = %state.id, "analysis run started");

        match self.run_phases(&state, &events).await {
            Ok(result) => {
                events
                    .emit(ProcessEvent::ProcessCompleted {
                        process_id: state.id.clone(),
                        duration_ms: state.elapsed_ms(),
                    })
                    .await;
                info!(
                    process_id = %state.id,
                    duration_ms = state.elapsed_ms(),
                    "analysis run completed"
                );
                Ok(result)
            }
            Err(err) => {
                error!(process_id = %state.id, error = %err, "analysis run failed");
                let partial = self.build_result(&state, None).await;
                match self.hooks.handle_process_failure(&err, &partial).await {
                    Some(recovered) => Ok(recovered),
                    None => Err(err),
                }
            }
        }
    }

    async fn run_phases(
        &self,
        state: &Arc<ProcessState>,
        events: &EventEmitter,
    ) -> EngineResult<ProcessResult> {
        // Phase 1: pre-process.
        self.emit_phase(state, events, Phase::PreProcess).await;
        let ctx = ProcessContext {
            process_id: state.id.clone(),
            sections: state.sections().await,
            metadata: state.metadata(),
        };
        if let Some(seed) = self.hooks.before_process_start(&ctx).await? {
            if let Some(sections) = seed.sections {
                state.replace_sections(sections).await;
            }
            if let Some(metadata) = seed.metadata {
                state.set_metadata(metadata);
            }
        }
        if state.section_count().await == 0 {
            return Err(EngineError::NoSections);
        }

        // Phase 2: plan.
        self.emit_phase(state, events, Phase::Plan).await;
        let declared = self.hooks.plugin().dimensions();
        let plan = self.build_plan(&declared)?;
        let specs: Arc<HashMap<String, DimensionSpec>> = Arc::new(
            declared
                .iter()
                .cloned()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        );

        // Phase 3: execute.
        self.emit_phase(state, events, Phase::Execute).await;
        self.execute_plan(state, events, &plan, &specs).await?;

        // Phase 4: finalize.
        self.emit_phase(state, events, Phase::Finalize).await;
        let flat = self.flat_results(state).await;
        let finalize_ctx = FinalizeContext {
            process_id: state.id.clone(),
            results: flat,
            metadata: state.metadata(),
        };
        if let Some(replacement) = self.hooks.finalize_results(&finalize_ctx).await? {
            self.merge_finalized(state, &specs, replacement).await;
        }
        let costs = match &self.config.pricing {
            Some(registry) => {
                let finalized = self.flat_results(state).await;
                Some(compute_costs(registry, &finalized))
            }
            None => None,
        };

        // Phase 5: post-process.
        self.emit_phase(state, events, Phase::PostProcess).await;
        let result = self.build_result(state, costs).await;
        let total = result.result_count();
        let failed = result.failure_count();
        let completion_ctx = CompletionContext {
            process_id: state.id.clone(),
            summary: ProcessSummary {
                total_dimensions: total,
                successful: total - failed,
                failed,
                duration_ms: state.elapsed_ms(),
            },
            metadata: state.metadata(),
        };
        Ok(self.hooks.after_process_complete(&completion_ctx, result).await)
    }

    /// Union of the declarative `depends_on` lists and the
    /// `define_dependencies` hook, validated into an execution plan.
    fn build_plan(&self, declared: &[DimensionSpec]) -> EngineResult<ExecutionPlan> {
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for spec in declared {
            if !spec.depends_on.is_empty() {
                dependencies
                    .entry(spec.name.clone())
                    .or_default()
                    .extend(spec.depends_on.iter().cloned());
            }
        }
        for (dimension, deps) in self.hooks.define_dependencies()? {
            let entry = dependencies.entry(dimension).or_default();
            for dep in deps {
                if !entry.contains(&dep) {
                    entry.push(dep);
                }
            }
        }
        DependencyGraphManager::plan(declared, &dependencies)
    }

    /// Phase 3 body: per group, globals first (concurrently), their
    /// transforms sequentially, then the group's section dimensions.
    async fn execute_plan(
        &self,
        state: &Arc<ProcessState>,
        events: &EventEmitter,
        plan: &ExecutionPlan,
        specs: &Arc<HashMap<String, DimensionSpec>>,
    ) -> EngineResult<()> {
        let provider_exec =
            ProviderExecutor::new(self.registry.clone(), self.hooks.clone(), &self.config);
        let executor = Arc::new(DimensionExecutor::new(
            self.hooks.clone(),
            provider_exec,
            self.config.clone(),
            Arc::clone(specs),
            events.clone(),
        ));

        for group in &plan.groups {
            let (globals, sections) = split_group_by_scope(group, specs);

            let global_runs = globals.iter().map(|name| {
                let executor = Arc::clone(&executor);
                let state = Arc::clone(state);
                let deps = plan.dependencies_of(name).to_vec();
                let name = name.to_string();
                async move { executor.execute_global(&state, &name, &deps).await }
            });
            for outcome in futures::future::join_all(global_runs).await {
                outcome?;
            }

            // A global may rewrite the section list; it must be stable
            // before any section task in the same group starts.
            for name in &globals {
                if let Some(spec) = specs.get(*name) {
                    TransformationManager::apply(state, &self.hooks, events, spec).await;
                }
            }

            if !sections.is_empty() {
                let dimensions: Vec<(String, Vec<String>)> = sections
                    .iter()
                    .map(|name| {
                        (
                            name.to_string(),
                            plan.dependencies_of(name).to_vec(),
                        )
                    })
                    .collect();
                executor
                    .execute_section_dimensions(state, &dimensions)
                    .await?;
            }
        }

        Ok(())
    }

    /// Flat view of all results: global results keyed by name, section
    /// results keyed `"<dimension>_section_<index>"`.
    async fn flat_results(&self, state: &Arc<ProcessState>) -> HashMap<String, DimensionResult> {
        let mut flat = state.global_results_snapshot();
        for (index, map) in state.section_results_snapshot().await.into_iter().enumerate() {
            for (dimension, result) in map {
                flat.insert(format!("{dimension}{SECTION_KEY_INFIX}{index}"), result);
            }
        }
        flat
    }

    /// Merge a `finalize_results` replacement map back into state, for both
    /// key shapes.
    async fn merge_finalized(
        &self,
        state: &Arc<ProcessState>,
        specs: &Arc<HashMap<String, DimensionSpec>>,
        replacement: HashMap<String, DimensionResult>,
    ) {
        for (key, result) in replacement {
            match parse_section_key(&key, specs) {
                Some((dimension, index)) => {
                    state.write_section_result(index, &dimension, result).await;
                }
                None => state.write_global_result(&key, result),
            }
        }
    }

    async fn build_result(
        &self,
        state: &Arc<ProcessState>,
        costs: Option<CostSummary>,
    ) -> ProcessResult {
        let sections = state.sections().await;
        let section_results = state.section_results_snapshot().await;
        let outcomes = sections
            .iter()
            .cloned()
            .zip(section_results)
            .map(|(section, results)| SectionOutcome { section, results })
            .collect();

        let metadata = state.metadata();
        ProcessResult {
            sections: outcomes,
            global_results: state.global_results_snapshot(),
            transformed_sections: sections,
            costs,
            metadata: if metadata.is_null() {
                None
            } else {
                Some(metadata)
            },
        }
    }

    async fn emit_phase(&self, state: &Arc<ProcessState>, events: &EventEmitter, phase: Phase) {
        events
            .emit(ProcessEvent::PhaseStarted {
                process_id: state.id.clone(),
                phase,
            })
            .await;
    }
}

/// Split `"<dimension>_section_<index>"` into its parts, when `dimension`
/// is a declared section dimension and `index` parses.
fn parse_section_key(
    key: &str,
    specs: &HashMap<String, DimensionSpec>,
) -> Option<(String, usize)> {
    let position = key.rfind(SECTION_KEY_INFIX)?;
    let dimension = &key[..position];
    let index: usize = key[position + SECTION_KEY_INFIX.len()..].parse().ok()?;
    if specs.contains_key(dimension) {
        Some((dimension.to_string(), index))
    } else {
        None
    }
}

/// Roll finalized result metadata up into a [`CostSummary`].
fn compute_costs(
    registry: &SharedPricingRegistry,
    results: &HashMap<String, DimensionResult>,
) -> CostSummary {
    let mut summary = CostSummary::new();
    for (key, result) in results {
        let Some(metadata) = &result.metadata else {
            continue;
        };
        let Some(tokens) = metadata.tokens else {
            continue;
        };
        let provider = metadata.provider.as_deref().unwrap_or("unknown");
        let dimension = key
            .rfind(SECTION_KEY_INFIX)
            .map(|position| &key[..position])
            .unwrap_or(key.as_str());

        let cost = match metadata.cost {
            Some(cost) => cost,
            None => metadata
                .model
                .as_deref()
                .and_then(|model| registry.get_pricing(provider, model))
                .map(|pricing| pricing.calculate_cost(tokens.input, tokens.output))
                .unwrap_or(0.0),
        };
        summary.record(dimension, provider, tokens.total as u64, cost);
    }
    summary
}
