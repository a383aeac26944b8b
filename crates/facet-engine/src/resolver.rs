//! Dependency resolution.
//!
//! Materialises the dependency inputs for one dimension execution from the
//! process state. Cross-scope consumption is where the work is: a global
//! dimension consuming a section dimension receives the engine-owned
//! aggregation envelope over every per-section result, in current section
//! order.

use std::collections::HashMap;

use facet_kernel::{
    DependencyMap, DimensionResult, DimensionScope, DimensionSpec, EngineResult,
};
use serde_json::json;

use crate::state::ProcessState;

/// Error message recorded for a per-section slot that has no result yet.
const NOT_YET_PRODUCED: &str = "not yet produced";

/// Materialises dependency maps from process state.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve the inputs of `dimension` with scope `scope` (and section
    /// index for section scope) against the current state.
    ///
    /// A dependency with no recorded result resolves to an error-bearing
    /// entry rather than failing: failed dependencies are data, and the
    /// dimension still executes.
    pub async fn resolve(
        state: &ProcessState,
        specs: &HashMap<String, DimensionSpec>,
        dependencies: &[String],
        scope: DimensionScope,
        section_index: Option<usize>,
    ) -> EngineResult<DependencyMap> {
        let mut resolved = DependencyMap::with_capacity(dependencies.len());

        for dep in dependencies {
            let entry = match specs.get(dep).map(|spec| spec.scope) {
                Some(DimensionScope::Global) => state
                    .global_result(dep)
                    .unwrap_or_else(|| missing(dep)),
                Some(DimensionScope::Section) => match scope {
                    DimensionScope::Global => aggregate_section_results(state, dep).await?,
                    DimensionScope::Section => {
                        let index = section_index.unwrap_or_default();
                        state
                            .section_result(index, dep)
                            .await
                            .unwrap_or_else(|| missing(dep))
                    }
                },
                None => missing(dep),
            };
            resolved.insert(dep.clone(), entry);
        }

        Ok(resolved)
    }
}

fn missing(dependency: &str) -> DimensionResult {
    DimensionResult::failed(format!("{dependency} not found in results"))
}

/// Wrap a section dimension's per-section results for a global consumer.
async fn aggregate_section_results(
    state: &ProcessState,
    dimension: &str,
) -> EngineResult<DimensionResult> {
    let snapshots = state.section_results_snapshot().await;
    let total = snapshots.len();
    let mut sections = Vec::with_capacity(total);
    for map in &snapshots {
        let value = match map.get(dimension) {
            Some(result) => serde_json::to_value(result)?,
            None => json!({ "error": NOT_YET_PRODUCED }),
        };
        sections.push(value);
    }

    Ok(DimensionResult::ok(json!({
        "aggregated": true,
        "sections": sections,
        "totalSections": total,
    })))
}
