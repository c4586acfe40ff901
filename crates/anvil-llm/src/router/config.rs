//! Router configuration

use super::types::ModelTier;
use serde::{Deserialize, Serialize};

/// Price of one thousand tokens, in dollars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPricing {
    /// Price per 1k prompt tokens
    pub input_per_1k: f64,
    /// Price per 1k completion tokens
    pub output_per_1k: f64,
}

impl TierPricing {
    /// Free pricing (local models)
    #[must_use]
    pub const fn free() -> Self {
        Self {
            input_per_1k: 0.0,
            output_per_1k: 0.0,
        }
    }

    /// Cost of a call with the given token counts
    #[must_use]
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (f64::from(prompt_tokens) * self.input_per_1k
            + f64::from(completion_tokens) * self.output_per_1k)
            / 1000.0
    }
}

/// Model names and prices per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Model served by the local backend
    #[serde(default = "default_local_model")]
    pub local_model: String,
    /// Remote model for medium subtasks
    #[serde(default = "default_standard_model")]
    pub standard_model: String,
    /// Remote model for complex subtasks
    #[serde(default = "default_premium_model")]
    pub premium_model: String,
    /// Standard tier pricing
    #[serde(default = "default_standard_pricing")]
    pub standard_pricing: TierPricing,
    /// Premium tier pricing
    #[serde(default = "default_premium_pricing")]
    pub premium_pricing: TierPricing,
}

fn default_local_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_standard_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_premium_model() -> String {
    "gpt-4o".to_string()
}

fn default_standard_pricing() -> TierPricing {
    TierPricing {
        input_per_1k: 0.000_15,
        output_per_1k: 0.000_6,
    }
}

fn default_premium_pricing() -> TierPricing {
    TierPricing {
        input_per_1k: 0.002_5,
        output_per_1k: 0.01,
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local_model: default_local_model(),
            standard_model: default_standard_model(),
            premium_model: default_premium_model(),
            standard_pricing: default_standard_pricing(),
            premium_pricing: default_premium_pricing(),
        }
    }
}

impl RouterConfig {
    /// Model name configured for a tier
    #[must_use]
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Local => &self.local_model,
            ModelTier::Standard => &self.standard_model,
            ModelTier::Premium => &self.premium_model,
        }
    }

    /// Pricing configured for a tier
    #[must_use]
    pub fn pricing_for(&self, tier: ModelTier) -> TierPricing {
        match tier {
            ModelTier::Local => TierPricing::free(),
            ModelTier::Standard => self.standard_pricing,
            ModelTier::Premium => self.premium_pricing,
        }
    }

    /// Set the local model
    #[must_use]
    pub fn with_local_model(mut self, model: impl Into<String>) -> Self {
        self.local_model = model.into();
        self
    }

    /// Set the remote models for the standard and premium tiers
    #[must_use]
    pub fn with_remote_models(
        mut self,
        standard: impl Into<String>,
        premium: impl Into<String>,
    ) -> Self {
        self.standard_model = standard.into();
        self.premium_model = premium.into();
        self
    }
}
