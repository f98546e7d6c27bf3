//! Layered configuration: compiled defaults, then a TOML file, then
//! `USAGE_LEDGER_*` environment variables.

#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use services::{DEFAULT_STORAGE_KEY, LedgerOptions};
use usage_core::model::{ModelRates, PricingError, PricingTable};

pub const DEFAULT_CONFIG_FILE: &str = "usage-ledger.toml";
pub const ENV_PREFIX: &str = "USAGE_LEDGER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub storage_key: String,
    /// Retention cap; 0 keeps the full history.
    pub max_records: usize,
    pub log_level: String,
    /// Fallback pricing tier, also the model used when none is given.
    pub default_model: String,
    /// Per-1K-token prices; empty means the built-in table.
    pub pricing: BTreeMap<String, RateConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://usage-ledger.sqlite3".to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_records: 0,
            log_level: "info".to_string(),
            default_model: PricingTable::GPT_35_TURBO.to_string(),
            pricing: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Build the pricing table, validating rates and the fallback tier.
    ///
    /// # Errors
    ///
    /// Returns `PricingError` if a rate is invalid or `default_model` is not priced.
    pub fn pricing_table(&self) -> Result<PricingTable, PricingError> {
        let entries: BTreeMap<String, ModelRates> = if self.pricing.is_empty() {
            PricingTable::default()
                .iter()
                .map(|(model, rates)| (model.to_string(), *rates))
                .collect()
        } else {
            self.pricing
                .iter()
                .map(|(model, rate)| {
                    ModelRates::from_per_1k(model, rate.input_per_1k, rate.output_per_1k)
                        .map(|rates| (model.clone(), rates))
                })
                .collect::<Result<_, _>>()?
        };
        PricingTable::new(self.default_model.clone(), entries)
    }

    #[must_use]
    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            storage_key: self.storage_key.clone(),
            max_records: NonZeroUsize::new(self.max_records),
        }
    }
}

/// Load configuration from `path` (or `./usage-ledger.toml`) with env overrides.
///
/// A missing file is not an error; defaults and env vars still apply.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, figment::Error> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<AppConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use usage_core::model::TokenUsage;

    #[test]
    fn defaults_use_built_in_pricing() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, AppConfig::default());

        let table = config.pricing_table().unwrap();
        assert_eq!(table.default_model(), "gpt-3.5-turbo");
        assert!(table.contains("gpt-4"));
        assert!(config.ledger_options().max_records.is_none());
    }

    #[test]
    fn file_overrides_pricing_and_retention() {
        let config = load_config_from_str(
            r#"
            storage_key = "chat_usage"
            max_records = 500
            default_model = "small"

            [pricing.small]
            input_per_1k = 0.001
            output_per_1k = 0.002

            [pricing.large]
            input_per_1k = 0.01
            output_per_1k = 0.03
            "#,
        )
        .unwrap();

        let options = config.ledger_options();
        assert_eq!(options.storage_key, "chat_usage");
        assert_eq!(options.max_records.map(NonZeroUsize::get), Some(500));

        let table = config.pricing_table().unwrap();
        assert_eq!(table.default_model(), "small");
        assert!(!table.contains("gpt-4"));
        let cost = usage_core::model::compute_cost(&table, &TokenUsage::new(1000, 1000), "large");
        assert_eq!(cost.to_string(), "0.0400");
    }

    #[test]
    fn unpriced_default_model_is_rejected() {
        let config = load_config_from_str(
            r#"
            default_model = "missing"

            [pricing.other]
            input_per_1k = 0.001
            output_per_1k = 0.002
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.pricing_table(),
            Err(PricingError::MissingDefaultTier(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some(Path::new("does-not-exist/usage-ledger.toml"))).unwrap();
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
    }
}
