//! Section transformations.
//!
//! After a global dimension produces its result, two rewrites may apply in
//! order: the declaration's legacy `transform` callback, then the plugin's
//! `transform_sections` hook over the already-transformed list (the hook
//! takes precedence by running second). A non-empty returned list replaces
//! the process state's sections and resets every per-section result map; an
//! empty list means "no change".
//!
//! Within a group, transforms run sequentially in group-enumeration order:
//! the *n*th sees the sections produced by the *(n-1)*th.

use std::sync::Arc;

use facet_kernel::{DimensionSpec, TransformContext};
use tracing::info;

use crate::events::{EventEmitter, ProcessEvent};
use crate::hooks::HookDispatcher;
use crate::state::ProcessState;

/// Applies section rewrites produced by global dimensions.
pub struct TransformationManager;

impl TransformationManager {
    /// Apply the transforms of one completed global dimension.
    ///
    /// Returns `true` when the section list was replaced.
    pub async fn apply(
        state: &Arc<ProcessState>,
        hooks: &HookDispatcher,
        events: &EventEmitter,
        spec: &DimensionSpec,
    ) -> bool {
        let Some(result) = state.global_result(&spec.name) else {
            return false;
        };

        let mut current = state.sections().await;
        let mut changed = false;

        if let Some(transform) = &spec.transform {
            if let Some(next) = transform(&result, &current) {
                if !next.is_empty() {
                    current = next;
                    changed = true;
                }
            }
        }

        let ctx = TransformContext {
            process_id: state.id.clone(),
            dimension: spec.name.clone(),
            result,
            sections: current.clone(),
            metadata: state.metadata(),
        };
        if let Some(next) = hooks.transform_sections(&ctx).await {
            if !next.is_empty() {
                current = next;
                changed = true;
            }
        }

        if changed {
            info!(
                dimension = %spec.name,
                sections = current.len(),
                "section list transformed"
            );
            let section_count = current.len();
            state.replace_sections(current).await;
            events
                .emit(ProcessEvent::SectionsTransformed {
                    process_id: state.id.clone(),
                    dimension: spec.name.clone(),
                    section_count,
                })
                .await;
        }

        changed
    }
}
