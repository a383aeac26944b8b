//! Run-scoped process state.
//!
//! One [`ProcessState`] exists per `process()` call and is shared by every
//! concurrent task of the run. Writers touch disjoint keys: a section task
//! writes only its own `(section index, dimension)` slot, a global task only
//! its dimension's slot. The section list and its result maps are replaced
//! together, only by the transformation pipeline, which runs in the
//! serialised globals-complete phase of a group.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use facet_kernel::{DimensionResult, Section};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-section result map. One exists per current section index.
pub type SectionResults = Arc<DashMap<String, DimensionResult>>;

/// Mutable state of one engine run.
pub struct ProcessState {
    /// Unique run identifier.
    pub id: String,
    /// Monotonic start of the run, for elapsed/timeout measurement.
    pub started_at: Instant,
    /// Wall-clock start, carried into run metadata.
    pub started_at_utc: DateTime<Utc>,
    /// Current (possibly transformed) section sequence.
    sections: RwLock<Vec<Section>>,
    /// One result map per current section index. Replaced together with
    /// `sections`, under the same write lock ordering.
    section_results: RwLock<Vec<SectionResults>>,
    /// Results of global dimensions.
    global_results: DashMap<String, DimensionResult>,
    /// Free-form run metadata, seeded by `before_process_start`.
    metadata: parking_lot::RwLock<serde_json::Value>,
}

impl ProcessState {
    pub fn new(sections: Vec<Section>) -> Self {
        let section_results = fresh_result_maps(sections.len());
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            sections: RwLock::new(sections),
            section_results: RwLock::new(section_results),
            global_results: DashMap::new(),
            metadata: parking_lot::RwLock::new(serde_json::Value::Null),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    // ---- sections ----

    /// Snapshot of the current section list.
    pub async fn sections(&self) -> Vec<Section> {
        self.sections.read().await.clone()
    }

    pub async fn section_count(&self) -> usize {
        self.sections.read().await.len()
    }

    pub async fn section(&self, index: usize) -> Option<Section> {
        self.sections.read().await.get(index).cloned()
    }

    /// Replace the section list and reset every per-section result map.
    ///
    /// Section identities change with the list, so prior per-section results
    /// are ill-defined against the new sequence.
    pub async fn replace_sections(&self, sections: Vec<Section>) {
        let mut section_guard = self.sections.write().await;
        let mut results_guard = self.section_results.write().await;
        *results_guard = fresh_result_maps(sections.len());
        *section_guard = sections;
    }

    // ---- section results ----

    /// The result map for one section index, or `None` when out of range.
    pub async fn section_result_map(&self, index: usize) -> Option<SectionResults> {
        self.section_results.read().await.get(index).cloned()
    }

    pub async fn write_section_result(
        &self,
        index: usize,
        dimension: &str,
        result: DimensionResult,
    ) {
        if let Some(map) = self.section_result_map(index).await {
            map.insert(dimension.to_string(), result);
        }
    }

    pub async fn section_result(&self, index: usize, dimension: &str) -> Option<DimensionResult> {
        let map = self.section_result_map(index).await?;
        map.get(dimension).map(|entry| entry.value().clone())
    }

    /// Snapshot of every section's results, in current section order.
    pub async fn section_results_snapshot(
        &self,
    ) -> Vec<std::collections::HashMap<String, DimensionResult>> {
        self.section_results
            .read()
            .await
            .iter()
            .map(|map| {
                map.iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect()
            })
            .collect()
    }

    // ---- global results ----

    pub fn write_global_result(&self, dimension: &str, result: DimensionResult) {
        self.global_results.insert(dimension.to_string(), result);
    }

    pub fn global_result(&self, dimension: &str) -> Option<DimensionResult> {
        self.global_results
            .get(dimension)
            .map(|entry| entry.value().clone())
    }

    pub fn global_results_snapshot(
        &self,
    ) -> std::collections::HashMap<String, DimensionResult> {
        self.global_results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    // ---- metadata ----

    pub fn metadata(&self) -> serde_json::Value {
        self.metadata.read().clone()
    }

    pub fn set_metadata(&self, metadata: serde_json::Value) {
        *self.metadata.write() = metadata;
    }
}

fn fresh_result_maps(count: usize) -> Vec<SectionResults> {
    (0..count).map(|_| Arc::new(DashMap::new())).collect()
}
