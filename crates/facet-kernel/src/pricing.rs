//! Provider pricing registry and run cost summaries.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Per-model pricing (USD per 1,000 tokens).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_1k_tokens: f64,
    pub output_cost_per_1k_tokens: f64,
}

impl ModelPricing {
    pub fn new(input_cost_per_1k: f64, output_cost_per_1k: f64) -> Self {
        Self {
            input_cost_per_1k_tokens: input_cost_per_1k,
            output_cost_per_1k_tokens: output_cost_per_1k,
        }
    }

    pub fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (input_tokens as f64 / 1000.0) * self.input_cost_per_1k_tokens;
        let output_cost = (output_tokens as f64 / 1000.0) * self.output_cost_per_1k_tokens;
        input_cost + output_cost
    }
}

/// Registry for looking up model pricing by provider and model name.
pub trait PricingRegistry: Send + Sync {
    fn get_pricing(&self, provider: &str, model: &str) -> Option<ModelPricing>;
    fn list_models(&self) -> Vec<(String, String)>;
}

pub type SharedPricingRegistry = Arc<dyn PricingRegistry>;

/// In-memory pricing registry.
///
/// Key format: `"provider/model"`. Lookup is case-insensitive and strips
/// trailing date suffixes (e.g. `"fast-model-2024-05-13"` matches
/// `"fast-model"`).
#[derive(Debug, Clone, Default)]
pub struct InMemoryPricingRegistry {
    prices: HashMap<String, ModelPricing>,
}

impl InMemoryPricingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pricing(
        mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        pricing: ModelPricing,
    ) -> Self {
        self.set_pricing(provider, model, pricing);
        self
    }

    pub fn set_pricing(
        &mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        pricing: ModelPricing,
    ) {
        let key = format!(
            "{}/{}",
            provider.into().to_lowercase(),
            model.into().to_lowercase()
        );
        self.prices.insert(key, pricing);
    }

    fn fuzzy_lookup(&self, provider: &str, model: &str) -> Option<&ModelPricing> {
        let provider_lower = provider.to_lowercase();
        let model_lower = model.to_lowercase();

        let exact_key = format!("{provider_lower}/{model_lower}");
        if let Some(pricing) = self.prices.get(&exact_key) {
            return Some(pricing);
        }

        // Strip date suffix (e.g. "model-2024-05-13" -> "model")
        let base_model = model_lower
            .split('-')
            .take_while(|part| part.parse::<u32>().is_err() || part.len() < 4)
            .collect::<Vec<_>>()
            .join("-");
        if base_model != model_lower {
            let base_key = format!("{provider_lower}/{base_model}");
            if let Some(pricing) = self.prices.get(&base_key) {
                return Some(pricing);
            }
        }

        None
    }
}

impl PricingRegistry for InMemoryPricingRegistry {
    fn get_pricing(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        self.fuzzy_lookup(provider, model).cloned()
    }

    fn list_models(&self) -> Vec<(String, String)> {
        self.prices
            .keys()
            .filter_map(|key| {
                let parts: Vec<&str> = key.splitn(2, '/').collect();
                if parts.len() == 2 {
                    Some((parts[0].to_string(), parts[1].to_string()))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Cost rollup for one run, computed from finalized result metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub by_dimension: HashMap<String, f64>,
    pub by_provider: HashMap<String, f64>,
    pub currency: String,
}

impl CostSummary {
    pub fn new() -> Self {
        Self {
            currency: "USD".to_string(),
            ..Default::default()
        }
    }

    /// Record one call's cost under a dimension and provider.
    pub fn record(&mut self, dimension: &str, provider: &str, tokens: u64, cost: f64) {
        self.total_cost += cost;
        self.total_tokens += tokens;
        *self.by_dimension.entry(dimension.to_string()).or_default() += cost;
        *self.by_provider.entry(provider.to_string()).or_default() += cost;
    }
}
