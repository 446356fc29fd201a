use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Credential resolution configuration.
///
/// ```toml
/// [auth]
/// master_key = "${GATEWAY_MASTER_KEY}"
///
/// [auth.api_key]
/// header_name = "X-API-Key"
/// key_prefix = "gw_live_"
///
/// [auth.bearer]
/// secret = "${GATEWAY_JWT_SECRET}"
/// issuer = "https://auth.example.com"
///
/// [auth.session]
/// header_name = "X-Session-Token"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Operator secret. A request carrying it may act on behalf of any user
    /// but must name that user explicitly. When unset, every presented
    /// master key is rejected.
    #[serde(default)]
    pub master_key: Option<String>,

    /// Header carrying the master key.
    #[serde(default = "default_master_key_header")]
    pub master_key_header: String,

    #[serde(default)]
    pub api_key: ApiKeyConfig,

    /// Signed bearer tokens. When absent, bearer tokens that are not API keys
    /// are rejected.
    #[serde(default)]
    pub bearer: Option<BearerConfig>,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            master_key_header: default_master_key_header(),
            api_key: ApiKeyConfig::default(),
            bearer: None,
            session: SessionConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.master_key
            && key.is_empty()
        {
            return Err(ConfigError::Validation(
                "auth.master_key cannot be empty; omit it to disable the master key".into(),
            ));
        }
        if self.master_key_header.is_empty() {
            return Err(ConfigError::Validation(
                "auth.master_key_header cannot be empty".into(),
            ));
        }
        self.api_key.validate()?;
        if let Some(bearer) = &self.bearer {
            bearer.validate()?;
        }
        self.session.validate()
    }
}

/// API key configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyConfig {
    /// Header name for the API key.
    #[serde(default = "default_api_key_header")]
    pub header_name: String,

    /// Prefix every issued key starts with. Bearer tokens with this prefix
    /// are treated as API keys.
    #[serde(default = "default_api_key_prefix")]
    pub key_prefix: String,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            header_name: default_api_key_header(),
            key_prefix: default_api_key_prefix(),
        }
    }
}

impl ApiKeyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.header_name.is_empty() {
            return Err(ConfigError::Validation(
                "API key header name cannot be empty".into(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "API key prefix cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// HS256 bearer token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BearerConfig {
    /// Shared HMAC secret.
    pub secret: String,

    /// Required `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Required `aud` claim.
    #[serde(default)]
    pub audience: Option<String>,

    /// Allowed clock skew in seconds when checking `exp`.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

impl BearerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Validation(
                "auth.bearer.secret cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Session token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Header carrying an opaque session token.
    #[serde(default = "default_session_header")]
    pub header_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            header_name: default_session_header(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.header_name.is_empty() {
            return Err(ConfigError::Validation(
                "auth.session.header_name cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_master_key_header() -> String {
    "X-Master-Key".to_string()
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_api_key_prefix() -> String {
    "gw_live_".to_string()
}

fn default_session_header() -> String {
    "X-Session-Token".to_string()
}

fn default_leeway() -> u64 {
    30
}
