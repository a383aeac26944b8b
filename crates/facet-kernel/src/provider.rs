//! Provider contract and registry.
//!
//! A *provider* is a named request/response service the engine dispatches
//! dimension work to. The engine resolves provider selections by name against
//! a [`ProviderRegistry`]; concrete implementations (HTTP clients, local
//! models, search APIs) live outside the core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dimension::ResultMetadata;
use crate::error::EngineResult;

/// Request dispatched to a provider for one dimension execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Name of the dimension this request belongs to.
    pub dimension: String,
    /// Opaque prompt payload produced by the plugin's `create_prompt`.
    pub input: serde_json::Value,
    /// Per-call options from the provider selection.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

impl ProviderRequest {
    pub fn new(dimension: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            dimension: dimension.into(),
            input,
            options: serde_json::Value::Null,
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// Structured payload returned by a provider.
///
/// A response with `error` set counts as a failed attempt in the retry loop,
/// exactly like a transport-level `Err`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl ProviderResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: ResultMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Canonical provider trait.
///
/// Implementations must be safe for concurrent invocation; the engine calls
/// `execute` from many tasks at once.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name used for registry lookup.
    fn name(&self) -> &str;

    /// Execute one request.
    async fn execute(&self, request: ProviderRequest) -> EngineResult<ProviderResponse>;
}

/// One provider choice within a selection chain.
#[derive(Debug, Clone, Default)]
pub struct ProviderChoice {
    /// Registry name of the provider.
    pub provider: String,
    /// Per-call options handed to the provider untouched.
    pub options: serde_json::Value,
    /// Delay before the first attempt of this choice.
    pub retry_after: Option<Duration>,
}

impl ProviderChoice {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            options: serde_json::Value::Null,
            retry_after: None,
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }
}

/// Primary provider plus ordered fallbacks for one dimension.
#[derive(Debug, Clone)]
pub struct ProviderSelection {
    pub primary: ProviderChoice,
    pub fallbacks: Vec<ProviderChoice>,
}

impl ProviderSelection {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            primary: ProviderChoice::new(provider),
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, choice: ProviderChoice) -> Self {
        self.fallbacks.push(choice);
        self
    }

    /// The full chain in try-order: primary, then each fallback.
    pub fn chain(&self) -> impl Iterator<Item = &ProviderChoice> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}

/// Name-keyed registry of providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of providers, keyed by their names.
    pub fn from_providers<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Provider>>,
    {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    /// Register a provider under its own name. Re-registering a name
    /// replaces the previous provider.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
