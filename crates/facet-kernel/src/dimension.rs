//! Dimension declarations and results.
//!
//! A *dimension* is one named analysis step. Section-scope dimensions run
//! once per section; global-scope dimensions run once per run and may rewrite
//! the section list through their transform.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::section::Section;

/// Execution scope of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionScope {
    /// Runs once per section.
    #[default]
    Section,
    /// Runs once per run, over all sections.
    Global,
}

impl DimensionScope {
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for DimensionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section => write!(f, "section"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Legacy section-rewrite callback attached to a dimension declaration.
///
/// Receives the dimension's result and the current section list; returning
/// `Some(sections)` replaces the list. The newer `transform_sections` hook
/// supplies the same capability on the plugin; when both exist the legacy
/// form runs first and the hook runs second over the already-transformed
/// list.
pub type SectionTransform =
    Arc<dyn Fn(&DimensionResult, &[Section]) -> Option<Vec<Section>> + Send + Sync>;

/// Declaration of one analysis dimension.
#[derive(Clone)]
pub struct DimensionSpec {
    /// Unique name within the plugin.
    pub name: String,
    /// Execution scope. Defaults to [`DimensionScope::Section`].
    pub scope: DimensionScope,
    /// Names of dimensions whose results this dimension consumes.
    pub depends_on: Vec<String>,
    /// Legacy section transform (global scope only).
    pub transform: Option<SectionTransform>,
}

impl DimensionSpec {
    /// Declare a section-scope dimension with no dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: DimensionScope::Section,
            depends_on: Vec::new(),
            transform: None,
        }
    }

    /// Switch the dimension to global scope.
    pub fn global(mut self) -> Self {
        self.scope = DimensionScope::Global;
        self
    }

    /// Declare dependencies on other dimensions.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a legacy section transform.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&DimensionResult, &[Section]) -> Option<Vec<Section>> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for DimensionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DimensionSpec")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("depends_on", &self.depends_on)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl From<&str> for DimensionSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DimensionSpec {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// Execution metadata attached to a dimension result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Any additional provider- or plugin-supplied fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Outcome of one dimension execution.
///
/// `data` and `error` are not mutually exclusive in the type: skipped
/// dimensions carry `metadata.skipped = true` and true failures carry
/// `error`. [`DimensionResult::is_error`] is the failure predicate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl DimensionResult {
    /// A successful result carrying `data`.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// A failed result carrying an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// A skipped result: no data, skip marker and reason in metadata.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            metadata: Some(ResultMetadata {
                skipped: Some(true),
                reason: Some(reason.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Attach metadata, replacing any existing metadata.
    pub fn with_metadata(mut self, metadata: ResultMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.skipped)
            .unwrap_or(false)
    }

    /// Mutable access to metadata, creating it if absent.
    pub fn metadata_mut(&mut self) -> &mut ResultMetadata {
        self.metadata.get_or_insert_with(ResultMetadata::default)
    }
}

/// Resolved dependency inputs for one dimension execution.
pub type DependencyMap = HashMap<String, DimensionResult>;

/// True iff any resolved dependency carries an error.
pub fn has_failed_dependencies(deps: &DependencyMap) -> bool {
    deps.values().any(DimensionResult::is_error)
}
