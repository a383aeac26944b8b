//! Sections: the unit of input content.

use serde::{Deserialize, Serialize};

/// A unit of input content plus free-form metadata.
///
/// Sections are immutable from the engine's perspective; the only way the
/// section list changes during a run is through the transformation pipeline
/// (a global dimension rewriting the list).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    /// The content analysed by section-scope dimensions.
    pub content: String,
    /// Arbitrary caller-owned metadata, carried through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Section {
    /// Create a section with the given content and null metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<&str> for Section {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

impl From<String> for Section {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}
