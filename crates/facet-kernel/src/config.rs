//! Engine configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::pricing::SharedPricingRegistry;

/// Minimum accepted timeout, for the run default and per-dimension overrides.
const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Tunables for one engine instance.
#[derive(Clone)]
pub struct EngineConfig {
    /// Size of the bounded work queue (tasks in flight at once).
    pub concurrency: usize,
    /// Retries per provider selection, beyond the first attempt.
    pub max_retries: u32,
    /// Base delay between retries; doubles per attempt, capped.
    pub retry_delay: Duration,
    /// Default per-dimension execution deadline.
    pub timeout: Duration,
    /// Per-dimension deadline overrides.
    pub dimension_timeouts: HashMap<String, Duration>,
    /// Record per-dimension errors and keep going (true), or surface the
    /// first failure to the phase level (false).
    pub continue_on_error: bool,
    /// Pricing registry for the cost summary; absent means no costs.
    pub pricing: Option<SharedPricingRegistry>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            concurrency: 5,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(60_000),
            dimension_timeouts: HashMap::new(),
            continue_on_error: true,
            pricing: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dimension_timeout(mut self, dimension: impl Into<String>, timeout: Duration) -> Self {
        self.dimension_timeouts.insert(dimension.into(), timeout);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_pricing(mut self, pricing: SharedPricingRegistry) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// The effective deadline for a dimension.
    pub fn timeout_for(&self, dimension: &str) -> Duration {
        self.dimension_timeouts
            .get(dimension)
            .copied()
            .unwrap_or(self.timeout)
    }

    /// Validate the configuration. Called by the engine constructor.
    pub fn validate(&self) -> EngineResult<()> {
        if self.concurrency < 1 {
            return Err(EngineError::configuration(
                "concurrency must be at least 1",
            ));
        }
        if self.timeout < MIN_TIMEOUT {
            return Err(EngineError::configuration(format!(
                "timeout must be at least {}ms",
                MIN_TIMEOUT.as_millis()
            )));
        }
        for (dimension, timeout) in &self.dimension_timeouts {
            if *timeout < MIN_TIMEOUT {
                return Err(EngineError::configuration(format!(
                    "timeout for dimension '{}' must be at least {}ms",
                    dimension,
                    MIN_TIMEOUT.as_millis()
                )));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("dimension_timeouts", &self.dimension_timeouts)
            .field("continue_on_error", &self.continue_on_error)
            .field("pricing", &self.pricing.as_ref().map(|_| "<registry>"))
            .finish()
    }
}
