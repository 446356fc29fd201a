use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Highest supported currency scale: one microcent.
pub const MAX_CURRENCY_SCALE: u32 = 6;

/// Cost computation settings.
///
/// ```toml
/// [billing]
/// currency_scale = 6
/// default_provider = "openai"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Number of decimal places (in dollars) computed costs are rounded to,
    /// using round-half-even. The ledger stores microcents, so anything
    /// above 6 would be lost.
    #[serde(default = "default_currency_scale")]
    pub currency_scale: u32,

    /// Provider assumed when a model identifier carries no `provider:`
    /// prefix.
    #[serde(default)]
    pub default_provider: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            currency_scale: default_currency_scale(),
            default_provider: None,
        }
    }
}

impl BillingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currency_scale > MAX_CURRENCY_SCALE {
            return Err(ConfigError::Validation(format!(
                "billing.currency_scale must be between 0 and {MAX_CURRENCY_SCALE}, got {}",
                self.currency_scale
            )));
        }
        if let Some(provider) = &self.default_provider
            && provider.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "billing.default_provider cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_currency_scale() -> u32 {
    MAX_CURRENCY_SCALE
}
