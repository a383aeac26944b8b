//! Dimension execution.
//!
//! Two entry points, one per scope. A global dimension runs once per run; a
//! section dimension runs once per current section, with every (section,
//! dimension) task submitted to a bounded work queue. Both paths share the
//! same body: resolve dependencies, run the pre-hooks, build the prompt,
//! invoke the provider pipeline, all under the dimension's deadline.

use std::collections::HashMap;
use std::sync::Arc;

use facet_kernel::{
    DimensionContext, DimensionResult, DimensionScope, DimensionSpec, EngineConfig, EngineError,
    EngineResult, ProviderResponse, ResultMetadata, SkipDecision,
};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::events::{EventEmitter, ProcessEvent};
use crate::hooks::HookDispatcher;
use crate::provider_exec::ProviderExecutor;
use crate::resolver::DependencyResolver;
use crate::state::ProcessState;

/// Executes dimensions against the process state.
pub struct DimensionExecutor {
    hooks: HookDispatcher,
    providers: ProviderExecutor,
    config: EngineConfig,
    specs: Arc<HashMap<String, DimensionSpec>>,
    semaphore: Arc<Semaphore>,
    events: EventEmitter,
}

impl DimensionExecutor {
    pub fn new(
        hooks: HookDispatcher,
        providers: ProviderExecutor,
        config: EngineConfig,
        specs: Arc<HashMap<String, DimensionSpec>>,
        events: EventEmitter,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        Self {
            hooks,
            providers,
            config,
            specs,
            semaphore,
            events,
        }
    }

    /// Execute one global dimension and write its result.
    ///
    /// Returns `Err` only when the dimension failed and
    /// `continue_on_error = false`.
    pub async fn execute_global(
        self: &Arc<Self>,
        state: &Arc<ProcessState>,
        dimension: &str,
        dependencies: &[String],
    ) -> EngineResult<()> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Other("work queue closed".into()))?;

        self.events
            .emit(ProcessEvent::DimensionStarted {
                process_id: state.id.clone(),
                dimension: dimension.to_string(),
                section_index: None,
            })
            .await;

        let mut ctx = self
            .base_context(state, dimension, DimensionScope::Global, None)
            .await;

        let decision = self.hooks.should_skip_global_dimension(&ctx).await;
        if decision.is_skip() {
            debug!(dimension, reason = decision.reason(), "global dimension skipped");
            drop(permit);
            state.write_global_result(dimension, global_skip_result(&decision));
            self.events
                .emit(ProcessEvent::DimensionCompleted {
                    process_id: state.id.clone(),
                    dimension: dimension.to_string(),
                    section_index: None,
                    success: true,
                })
                .await;
            return Ok(());
        }

        let result = {
            let outcome = self.run_with_deadline(state, &mut ctx, dependencies).await;
            match outcome {
                Ok(result) => result,
                Err(error) => {
                    drop(permit);
                    match self.recover_failure(&ctx, error).await {
                        Ok(recovered) => {
                            self.finish_global(state, &ctx, recovered).await;
                            return Ok(());
                        }
                        // continue_on_error = false: record, then surface.
                        Err(error) => {
                            self.finish_global(
                                state,
                                &ctx,
                                DimensionResult::failed(error.to_string()),
                            )
                            .await;
                            return Err(error);
                        }
                    }
                }
            }
        };
        drop(permit);

        self.finish_global(state, &ctx, result).await;
        Ok(())
    }

    async fn finish_global(
        &self,
        state: &Arc<ProcessState>,
        ctx: &DimensionContext,
        result: DimensionResult,
    ) {
        self.hooks.after_dimension_execute(ctx, &result).await;
        let success = !result.is_error();
        state.write_global_result(&ctx.dimension, result);
        self.events
            .emit(ProcessEvent::DimensionCompleted {
                process_id: state.id.clone(),
                dimension: ctx.dimension.clone(),
                section_index: None,
                success,
            })
            .await;
    }

    /// Execute every section dimension of a group across all current
    /// sections through the bounded work queue, awaiting the whole group.
    ///
    /// Sibling tasks are never cancelled; with `continue_on_error = false`
    /// the first failure is returned after all tasks finish.
    pub async fn execute_section_dimensions(
        self: &Arc<Self>,
        state: &Arc<ProcessState>,
        dimensions: &[(String, Vec<String>)],
    ) -> EngineResult<()> {
        let section_count = state.section_count().await;
        let mut tasks: JoinSet<EngineResult<()>> = JoinSet::new();

        for (dimension, dependencies) in dimensions {
            for index in 0..section_count {
                let executor = Arc::clone(self);
                let state = Arc::clone(state);
                let dimension = dimension.clone();
                let dependencies = dependencies.clone();
                tasks.spawn(async move {
                    executor
                        .execute_section_task(&state, &dimension, &dependencies, index)
                        .await
                });
            }
        }

        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => Err(EngineError::Other(format!(
                    "section task panicked: {join_error}"
                ))),
            };
            if let Err(error) = outcome {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// One (section index x dimension) task.
    async fn execute_section_task(
        self: &Arc<Self>,
        state: &Arc<ProcessState>,
        dimension: &str,
        dependencies: &[String],
        index: usize,
    ) -> EngineResult<()> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Other("work queue closed".into()))?;

        self.events
            .emit(ProcessEvent::DimensionStarted {
                process_id: state.id.clone(),
                dimension: dimension.to_string(),
                section_index: Some(index),
            })
            .await;

        let mut ctx = self
            .base_context(state, dimension, DimensionScope::Section, Some(index))
            .await;

        let decision = self.hooks.should_skip_section_dimension(&ctx).await;
        if decision.is_skip() {
            debug!(
                dimension,
                section = index,
                reason = decision.reason(),
                "section dimension skipped"
            );
            drop(permit);
            state
                .write_section_result(index, dimension, DimensionResult::skipped(decision.reason()))
                .await;
            self.events
                .emit(ProcessEvent::DimensionCompleted {
                    process_id: state.id.clone(),
                    dimension: dimension.to_string(),
                    section_index: Some(index),
                    success: true,
                })
                .await;
            return Ok(());
        }

        let (result, failure) = match self.run_with_deadline(state, &mut ctx, dependencies).await {
            Ok(result) => (result, None),
            Err(error) => {
                match self.recover_failure(&ctx, error).await {
                    Ok(recovered) => (recovered, None),
                    // continue_on_error = false: record, then surface.
                    Err(error) => (DimensionResult::failed(error.to_string()), Some(error)),
                }
            }
        };
        drop(permit);

        self.hooks.after_dimension_execute(&ctx, &result).await;
        let success = !result.is_error();
        state.write_section_result(index, dimension, result).await;
        self.events
            .emit(ProcessEvent::DimensionCompleted {
                process_id: state.id.clone(),
                dimension: dimension.to_string(),
                section_index: Some(index),
                success,
            })
            .await;

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Steps 2-5 of the dimension pipeline under the dimension's deadline.
    ///
    /// The deadline covers dependency resolution through the provider call.
    /// On expiry the in-flight future is dropped, so a late provider result
    /// can never mutate state.
    async fn run_with_deadline(
        &self,
        state: &Arc<ProcessState>,
        ctx: &mut DimensionContext,
        dependencies: &[String],
    ) -> EngineResult<DimensionResult> {
        let deadline = self.config.timeout_for(&ctx.dimension);
        match tokio::time::timeout(deadline, self.run_body(state, ctx, dependencies)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::DimensionTimeout {
                dimension: ctx.dimension.clone(),
                timeout_ms: deadline.as_millis() as u64,
            }),
        }
    }

    async fn run_body(
        &self,
        state: &Arc<ProcessState>,
        ctx: &mut DimensionContext,
        dependencies: &[String],
    ) -> EngineResult<DimensionResult> {
        let resolved = DependencyResolver::resolve(
            state,
            &self.specs,
            dependencies,
            ctx.scope,
            ctx.section_index,
        )
        .await?;
        ctx.dependencies = self.hooks.transform_dependencies(ctx, resolved).await;

        self.hooks.before_dimension_execute(ctx).await;

        let request = self.hooks.create_prompt(ctx).await?;
        let selection = self.hooks.select_provider(&ctx.dimension);
        let response = self.providers.execute(ctx, request, &selection).await?;
        Ok(response_to_result(response))
    }

    /// Route a dimension failure through `handle_dimension_failure`, then
    /// apply the `continue_on_error` policy.
    async fn recover_failure(
        &self,
        ctx: &DimensionContext,
        error: EngineError,
    ) -> EngineResult<DimensionResult> {
        warn!(
            dimension = %ctx.dimension,
            section = ?ctx.section_index,
            error = %error,
            "dimension failed"
        );
        if let Some(mut result) = self.hooks.handle_dimension_failure(ctx, &error).await {
            result.metadata_mut().fallback = Some(true);
            return Ok(result);
        }
        if self.config.continue_on_error {
            Ok(DimensionResult::failed(error.to_string()))
        } else {
            Err(error)
        }
    }

    async fn base_context(
        &self,
        state: &Arc<ProcessState>,
        dimension: &str,
        scope: DimensionScope,
        section_index: Option<usize>,
    ) -> DimensionContext {
        let sections = state.sections().await;
        let section = section_index.and_then(|index| sections.get(index).cloned());
        DimensionContext {
            process_id: state.id.clone(),
            dimension: dimension.to_string(),
            scope,
            section_index,
            section,
            dependencies: Default::default(),
            sections,
            metadata: state.metadata(),
        }
    }
}

fn response_to_result(response: ProviderResponse) -> DimensionResult {
    DimensionResult {
        data: response.data,
        error: response.error,
        metadata: response.metadata,
    }
}

/// Global skips carry the marker in `data` as well as `metadata`.
fn global_skip_result(decision: &SkipDecision) -> DimensionResult {
    DimensionResult {
        data: Some(json!({ "skipped": true })),
        error: None,
        metadata: Some(ResultMetadata {
            skipped: Some(true),
            reason: Some(decision.reason().to_string()),
            ..Default::default()
        }),
    }
}
