//! Configuration module for the billing kernel.
//!
//! The kernel is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! type = "sqlite"
//! path = "billing.db"
//!
//! [auth]
//! master_key = "${GATEWAY_MASTER_KEY}"
//!
//! [auth.bearer]
//! secret = "${GATEWAY_JWT_SECRET}"
//!
//! [jobs.budget_reset]
//! interval_secs = 60
//! ```

mod auth;
mod billing;
mod database;
mod jobs;
mod observability;

use std::path::Path;

pub use auth::*;
pub use billing::*;
pub use database::*;
pub use jobs::*;
pub use observability::*;
use serde::{Deserialize, Serialize};

/// Root configuration for the billing kernel.
///
/// All sections are optional with defaults, so an empty file is a valid
/// (database-less) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    /// Database configuration for users, keys, budgets, pricing and usage.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Credential resolution configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Cost computation settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Background workers.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl KernelConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let mut config: KernelConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.auth.validate()?;
        self.billing.validate()?;
        self.jobs.validate()?;

        if self.auth.master_key.is_some() && self.database.is_none() {
            tracing::warn!(
                "A master key is configured without a database; every charge will fail \
                 because there is nowhere to record usage"
            );
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables that appear after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid interpolation pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
