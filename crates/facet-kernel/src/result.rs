//! Process result: the object returned by one engine run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionResult;
use crate::pricing::CostSummary;
use crate::section::Section;

/// One section paired with its per-dimension results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub section: Section,
    pub results: HashMap<String, DimensionResult>,
}

/// Aggregate result of one `process()` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    /// Final (possibly transformed) sections, each with its results.
    pub sections: Vec<SectionOutcome>,
    /// Results of global-scope dimensions, keyed by dimension name.
    pub global_results: HashMap<String, DimensionResult>,
    /// The final section sequence after all transformations.
    pub transformed_sections: Vec<Section>,
    /// Cost rollup; present only when a pricing registry is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub costs: Option<CostSummary>,
    /// Run metadata accumulated by hooks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ProcessResult {
    /// Count of dimension results carrying an error, across both scopes.
    pub fn failure_count(&self) -> usize {
        let section_failures: usize = self
            .sections
            .iter()
            .map(|s| s.results.values().filter(|r| r.is_error()).count())
            .sum();
        let global_failures = self
            .global_results
            .values()
            .filter(|r| r.is_error())
            .count();
        section_failures + global_failures
    }

    /// Count of all dimension results, across both scopes.
    pub fn result_count(&self) -> usize {
        let section_results: usize = self.sections.iter().map(|s| s.results.len()).sum();
        section_results + self.global_results.len()
    }
}

/// Summary counts handed to `after_process_complete`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub total_dimensions: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_ms: u64,
}
