//! Facet Kernel: contracts and data model for the dimensional analysis
//! engine.
//!
//! This crate defines the shapes the engine and its users agree on:
//!
//! - [`Section`] / [`DimensionSpec`] / [`DimensionResult`]: the data model
//! - [`AnalysisPlugin`]: the user-supplied plugin with optional lifecycle
//!   hooks as default trait methods
//! - [`Provider`] / [`ProviderRegistry`]: the request/response services the
//!   engine dispatches dimension work to
//! - [`EngineConfig`]: tunables (concurrency, retries, timeouts, pricing)
//! - [`EngineError`]: the error taxonomy with stable string kind tags
//! - [`PricingRegistry`] / [`CostSummary`]: per-run cost accounting
//!
//! The execution machinery lives in `facet-engine`.

pub mod config;
pub mod dimension;
pub mod error;
pub mod plugin;
pub mod pricing;
pub mod provider;
pub mod result;
pub mod section;

pub use config::EngineConfig;
pub use dimension::{
    has_failed_dependencies, DependencyMap, DimensionResult, DimensionScope, DimensionSpec,
    ResultMetadata, SectionTransform, TokenUsage,
};
pub use error::{EngineError, EngineResult, ErrorSeverity};
pub use plugin::{
    AnalysisPlugin, CompletionContext, DimensionContext, FallbackContext, FallbackDirective,
    FinalizeContext, PluginResult, ProcessContext, ProcessSeed, RetryContext, RetryDirective,
    SkipDecision, TransformContext, DEFAULT_SKIP_REASON,
};
pub use pricing::{
    CostSummary, InMemoryPricingRegistry, ModelPricing, PricingRegistry, SharedPricingRegistry,
};
pub use provider::{
    Provider, ProviderChoice, ProviderRegistry, ProviderRequest, ProviderResponse,
    ProviderSelection,
};
pub use result::{ProcessResult, ProcessSummary, SectionOutcome};
pub use section::Section;
