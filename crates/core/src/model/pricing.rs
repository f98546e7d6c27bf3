use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cost::Cost;
use super::usage::TokenUsage;

/// Token-price units per ten-thousandth of a currency unit.
///
/// `tokens * micro_per_million` yields 1e-12 currency units; a stored cost
/// unit is 1e-4, so the ratio is 1e8.
const PICO_PER_COST_UNIT: u128 = 100_000_000;

/// Micro-units per million tokens for a rate of 1.0 per thousand tokens.
const MICRO_PER_MILLION_PER_1K: f64 = 1_000_000_000.0;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PricingError {
    #[error("default pricing tier {0:?} is not present in the table")]
    MissingDefaultTier(String),
    #[error("invalid rate for {model}: {rate}")]
    InvalidRate { model: String, rate: f64 },
}

/// Per-model rates, expressed in micro-units per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRates {
    pub input_micro_usd_per_million: u64,
    pub output_micro_usd_per_million: u64,
}

impl ModelRates {
    #[must_use]
    pub const fn new(input_micro_usd_per_million: u64, output_micro_usd_per_million: u64) -> Self {
        Self {
            input_micro_usd_per_million,
            output_micro_usd_per_million,
        }
    }

    /// Build rates from per-1K-token decimal prices (e.g. `0.0005`).
    ///
    /// # Errors
    ///
    /// Returns `PricingError::InvalidRate` if either rate is negative or not finite.
    pub fn from_per_1k(model: &str, input_per_1k: f64, output_per_1k: f64) -> Result<Self, PricingError> {
        Ok(Self {
            input_micro_usd_per_million: per_1k_to_micro(model, input_per_1k)?,
            output_micro_usd_per_million: per_1k_to_micro(model, output_per_1k)?,
        })
    }

    /// Cost of the given usage at these rates, rounded half-up to 4 decimal places.
    #[must_use]
    pub fn cost_of(&self, usage: &TokenUsage) -> Cost {
        let prompt =
            u128::from(usage.prompt_tokens) * u128::from(self.input_micro_usd_per_million);
        let completion =
            u128::from(usage.completion_tokens) * u128::from(self.output_micro_usd_per_million);
        let exact = prompt + completion;
        let rounded = (exact + PICO_PER_COST_UNIT / 2) / PICO_PER_COST_UNIT;
        Cost::from_ten_thousandths(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn per_1k_to_micro(model: &str, rate: f64) -> Result<u64, PricingError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(PricingError::InvalidRate {
            model: model.to_string(),
            rate,
        });
    }
    Ok((rate * MICRO_PER_MILLION_PER_1K).round() as u64)
}

/// Static model pricing with a designated fallback tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingTable {
    default_model: String,
    default_rates: ModelRates,
    entries: BTreeMap<String, ModelRates>,
}

impl PricingTable {
    pub const GPT_35_TURBO: &'static str = "gpt-3.5-turbo";
    pub const GPT_4: &'static str = "gpt-4";

    /// Build a table whose fallback is `default_model`.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::MissingDefaultTier` if `default_model` has no entry.
    pub fn new(
        default_model: impl Into<String>,
        entries: BTreeMap<String, ModelRates>,
    ) -> Result<Self, PricingError> {
        let default_model = default_model.into();
        let Some(default_rates) = entries.get(&default_model).copied() else {
            return Err(PricingError::MissingDefaultTier(default_model));
        };
        Ok(Self {
            default_model,
            default_rates,
            entries,
        })
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    /// Rates for `model`, falling back to the default tier on a miss.
    #[must_use]
    pub fn rates_for(&self, model: &str) -> &ModelRates {
        self.entries.get(model).unwrap_or(&self.default_rates)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let default_rates = ModelRates::new(500_000, 1_500_000);
        let mut entries = BTreeMap::new();
        entries.insert(Self::GPT_35_TURBO.to_string(), default_rates);
        entries.insert(Self::GPT_4.to_string(), ModelRates::new(30_000_000, 60_000_000));
        Self {
            default_model: Self::GPT_35_TURBO.to_string(),
            default_rates,
            entries,
        }
    }
}

/// Cost of a single call: unknown models are priced at the default tier.
#[must_use]
pub fn compute_cost(pricing: &PricingTable, usage: &TokenUsage, model: &str) -> Cost {
    pricing.rates_for(model).cost_of(usage)
}
