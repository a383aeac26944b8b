//! Facet Engine: the execution machinery behind the dimensional analysis
//! DAG.
//!
//! The engine takes a plugin (dimension declarations + hooks), a provider
//! registry, and a configuration, then drives five phases per run:
//!
//! 1. **Pre-process**: `before_process_start` may seed sections/metadata
//! 2. **Plan**: validate the dependency graph, partition into parallel
//!    groups (Kahn levels)
//! 3. **Execute**: per group: global dimensions concurrently, their section
//!    transforms sequentially, then section tasks through a bounded work
//!    queue, each under a per-dimension deadline with retry/fallback at the
//!    provider layer
//! 4. **Finalize**: flat result view, `finalize_results` merge, cost rollup
//! 5. **Post-process**: summary counts and `after_process_complete`
//!
//! ```rust,ignore
//! use facet_engine::AnalysisEngine;
//! use facet_kernel::{EngineConfig, ProviderRegistry, Section};
//!
//! let engine = AnalysisEngine::new(plugin, providers, EngineConfig::new())?;
//! let result = engine.process(vec![Section::new("a. b. c")]).await?;
//! ```

pub mod dimension_exec;
pub mod events;
pub mod graph;
pub mod hooks;
pub mod phases;
pub mod provider_exec;
pub mod resolver;
pub mod state;
pub mod transform;

pub use dimension_exec::DimensionExecutor;
pub use events::{EventEmitter, Phase, ProcessEvent};
pub use graph::{DependencyGraphManager, ExecutionPlan};
pub use hooks::HookDispatcher;
pub use phases::AnalysisEngine;
pub use provider_exec::ProviderExecutor;
pub use resolver::DependencyResolver;
pub use state::ProcessState;
pub use transform::TransformationManager;
