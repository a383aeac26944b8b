//! Engine Error Types
//!
//! Single error hierarchy for the whole engine. Every failure the engine can
//! surface to a caller is one of these variants; each variant carries a
//! stable string tag (see [`EngineError::kind`]) so callers can match on
//! error kinds without depending on the Rust type.
//!
//! Plugin hooks return [`anyhow::Error`] (see the `plugin` module); the hook
//! dispatcher converts at the boundary via [`EngineError::Plugin`].

use std::fmt;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The run has no sections after pre-processing.
    #[error("no sections to process")]
    NoSections,

    /// The dependency graph contains a cycle. The path lists the dimensions
    /// along the cycle, ending where it started.
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// A dimension depends on a name that is not a declared dimension.
    #[error("dimension '{dimension}' depends on unknown dimension '{missing}'")]
    DependencyNotFound { dimension: String, missing: String },

    /// Input validation failed outside of configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Engine configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider registry is empty.
    #[error("no providers registered")]
    NoProviders,

    /// A dimension exceeded its execution deadline.
    #[error("dimension '{dimension}' timed out after {timeout_ms}ms")]
    DimensionTimeout { dimension: String, timeout_ms: u64 },

    /// Every selection in a dimension's provider chain was exhausted.
    #[error("dimension '{dimension}' failed: all providers exhausted ({})", .providers.join(", "))]
    AllProvidersFailed {
        dimension: String,
        providers: Vec<String>,
    },

    /// A provider call failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// A plugin hook failed.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Serialization / deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other / untyped error.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a plugin error.
    pub fn plugin(msg: impl Into<String>) -> Self {
        Self::Plugin(msg.into())
    }

    /// Stable string tag for the error kind.
    ///
    /// These tags are part of the public contract: they survive refactors of
    /// the Rust enum and are what result metadata and logs carry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoSections => "NoSections",
            Self::CircularDependency { .. } => "CircularDependency",
            Self::DependencyNotFound { .. } => "DependencyNotFound",
            Self::Validation(_) => "ValidationError",
            Self::Configuration(_) => "ConfigurationError",
            Self::NoProviders => "NoProvidersError",
            Self::DimensionTimeout { .. } => "DimensionTimeout",
            Self::AllProvidersFailed { .. } => "AllProvidersFailed",
            Self::Provider(_) => "ProviderError",
            Self::Plugin(_) => "PluginError",
            Self::Serialization(_) => "SerializationError",
            Self::Other(_) => "Other",
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::DimensionTimeout { .. } | Self::Other(_)
        )
    }

    /// Whether the error is a planning failure that no hook can recover.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. } | Self::DependencyNotFound { .. }
        )
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Plugin(format!("{err:#}"))
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

/// Severity classification used by logging and the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Unrecoverable, the run cannot proceed.
    Fatal,
    /// The operation failed but the run continues.
    Error,
    /// Retrying may succeed.
    Retryable,
}

impl EngineError {
    /// Severity of this error.
    pub fn severity(&self) -> ErrorSeverity {
        if self.is_retryable() {
            ErrorSeverity::Retryable
        } else if self.is_planning() || matches!(self, Self::Configuration(_) | Self::NoProviders) {
            ErrorSeverity::Fatal
        } else {
            ErrorSeverity::Error
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Error => write!(f, "error"),
            Self::Retryable => write!(f, "retryable"),
        }
    }
}
