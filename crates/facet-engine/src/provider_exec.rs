//! Provider invocation pipeline.
//!
//! Executes one provider call for a dimension: walks the selection chain
//! (primary, then each fallback), giving every selection up to
//! `max_retries + 1` attempts with capped exponential backoff between them.
//! The plugin steers the loop through `handle_retry` (replace the request or
//! veto further retries) and `handle_provider_fallback` (stop the chain).

use std::time::Duration;

use facet_kernel::{
    DimensionContext, EngineConfig, EngineError, EngineResult, FallbackContext, ProviderRegistry,
    ProviderRequest, ProviderResponse, ProviderSelection, RetryContext,
};
use tracing::{debug, warn};

use crate::hooks::HookDispatcher;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Single-request pipeline: retry loop, fallback chain, pre/post hooks.
pub struct ProviderExecutor {
    registry: ProviderRegistry,
    hooks: HookDispatcher,
    max_retries: u32,
    retry_delay: Duration,
}

impl ProviderExecutor {
    pub fn new(registry: ProviderRegistry, hooks: HookDispatcher, config: &EngineConfig) -> Self {
        Self {
            registry,
            hooks,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    /// Execute `request` against the selection chain.
    ///
    /// Returns the first successful response (with the serving provider
    /// stamped into its metadata), or [`EngineError::AllProvidersFailed`]
    /// enumerating the tried provider names.
    pub async fn execute(
        &self,
        ctx: &DimensionContext,
        request: ProviderRequest,
        selection: &ProviderSelection,
    ) -> EngineResult<ProviderResponse> {
        let chain: Vec<_> = selection.chain().collect();
        let mut tried: Vec<String> = Vec::new();
        let mut last_error = String::from("no provider attempted");

        for (position, choice) in chain.iter().enumerate() {
            let Some(provider) = self.registry.get(&choice.provider) else {
                warn!(
                    provider = %choice.provider,
                    dimension = %ctx.dimension,
                    "provider not registered, moving to next selection"
                );
                tried.push(choice.provider.clone());
                continue;
            };

            if let Some(delay) = choice.retry_after {
                tokio::time::sleep(delay).await;
            }

            let mut current = request.clone();
            if !choice.options.is_null() {
                current.options = choice.options.clone();
            }
            current = self.hooks.before_provider_execute(ctx, current).await;

            let attempts = self.max_retries + 1;
            let mut cancelled = false;
            for attempt in 1..=attempts {
                let outcome = provider.execute(current.clone()).await;
                let error = match outcome {
                    Ok(response) if !response.is_error() => {
                        debug!(
                            provider = %choice.provider,
                            dimension = %ctx.dimension,
                            attempt,
                            "provider call succeeded"
                        );
                        let mut response = self.hooks.after_provider_execute(ctx, response).await;
                        let metadata = response.metadata.get_or_insert_with(Default::default);
                        if metadata.provider.is_none() {
                            metadata.provider = Some(choice.provider.clone());
                        }
                        return Ok(response);
                    }
                    Ok(response) => response.error.unwrap_or_else(|| "provider error".into()),
                    Err(err) => err.to_string(),
                };

                warn!(
                    provider = %choice.provider,
                    dimension = %ctx.dimension,
                    attempt,
                    error = %error,
                    "provider attempt failed"
                );
                last_error = error.clone();

                let directive = self
                    .hooks
                    .handle_retry(&RetryContext {
                        dimension: ctx.dimension.clone(),
                        attempt,
                        error,
                        request: current.clone(),
                    })
                    .await;
                if let Some(replacement) = directive.request {
                    current = replacement;
                }
                if directive.cancel {
                    cancelled = true;
                    break;
                }
                if attempt < attempts {
                    tokio::time::sleep(backoff_delay(self.retry_delay, attempt)).await;
                }
            }

            tried.push(choice.provider.clone());
            if cancelled {
                debug!(
                    provider = %choice.provider,
                    dimension = %ctx.dimension,
                    "retries vetoed by plugin"
                );
            }

            let next_provider = chain.get(position + 1).map(|c| c.provider.clone());
            let directive = self
                .hooks
                .handle_provider_fallback(&FallbackContext {
                    dimension: ctx.dimension.clone(),
                    error: last_error.clone(),
                    failed_provider: choice.provider.clone(),
                    next_provider,
                })
                .await;
            if directive.cancel {
                break;
            }
        }

        Err(EngineError::AllProvidersFailed {
            dimension: ctx.dimension.clone(),
            providers: tried,
        })
    }
}

/// Delay after the `attempt`-th failure: `base * 2^(attempt-1)`, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}
