use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Background worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    #[serde(default)]
    pub budget_reset: BudgetResetConfig,
}

impl JobsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.budget_reset.validate()
    }
}

/// Configuration for the budget reset worker.
///
/// On every tick the worker pages through active budgets and restores the
/// ones whose period has rolled over.
///
/// ```toml
/// [jobs.budget_reset]
/// enabled = true
/// interval_secs = 60
/// batch_size = 500
/// dry_run = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetResetConfig {
    /// Run the worker.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between ticks.
    /// Default: 60
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Budgets fetched per page.
    /// Default: 500
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Log what would be reset without writing anything.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for BudgetResetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            dry_run: false,
        }
    }
}

impl BudgetResetConfig {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "jobs.budget_reset.interval_secs must be greater than 0".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "jobs.budget_reset.batch_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    500
}
