//! HS256 bearer tokens.
//!
//! Tokens are signed with the shared secret from `[auth.bearer]`. A token
//! may name a session through its `sid` claim, which ties its validity to
//! that session's lifecycle.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;
use crate::config::BearerConfig;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Acting user id.
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: u64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Linked session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Verifies bearer tokens against the configured secret.
pub struct BearerValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl BearerValidator {
    pub fn new(config: &BearerConfig) -> Self {
        // Pin the algorithm; the header's `alg` is never trusted.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<BearerClaims, AuthError> {
        decode::<BearerClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Bearer token validation failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
                    _ => AuthError::InvalidCredential,
                }
            })
    }
}

/// Sign claims with the configured secret.
pub fn issue_bearer_token(config: &BearerConfig, claims: &BearerClaims) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to sign bearer token");
        AuthError::InvalidCredential
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn config() -> BearerConfig {
        BearerConfig {
            secret: "test-secret-with-enough-entropy".into(),
            issuer: Some("gateway".into()),
            audience: None,
            leeway_secs: 0,
        }
    }

    fn claims(exp_offset: i64) -> BearerClaims {
        let now = Utc::now().timestamp();
        BearerClaims {
            sub: "alice".into(),
            exp: (now + exp_offset) as u64,
            iat: now as u64,
            iss: Some("gateway".into()),
            aud: None,
            sid: None,
            scope: None,
        }
    }

    #[test]
    fn test_valid_token() {
        let config = config();
        let token = issue_bearer_token(&config, &claims(3600)).unwrap();
        let validated = BearerValidator::new(&config).validate(&token).unwrap();
        assert_eq!(validated.sub, "alice");
    }

    #[test]
    fn test_expired_token() {
        let config = config();
        let token = issue_bearer_token(&config, &claims(-3600)).unwrap();
        let err = BearerValidator::new(&config).validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::ExpiredCredential));
    }

    #[test]
    fn test_wrong_secret() {
        let token = issue_bearer_token(&config(), &claims(3600)).unwrap();
        let other = BearerConfig {
            secret: "a-different-secret".into(),
            ..config()
        };
        let err = BearerValidator::new(&other).validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));
    }

    #[test]
    fn test_wrong_issuer() {
        let config = config();
        let mut foreign = claims(3600);
        foreign.iss = Some("someone-else".into());
        let token = issue_bearer_token(&config, &foreign).unwrap();
        let err = BearerValidator::new(&config).validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let config = BearerConfig {
            audience: Some("billing".into()),
            ..config()
        };
        let mut wrong_aud = claims(3600);
        wrong_aud.aud = Some("dashboard".into());
        let token = issue_bearer_token(&config, &wrong_aud).unwrap();
        let err = BearerValidator::new(&config).validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));

        let mut with_aud = claims(3600);
        with_aud.aud = Some("billing".into());
        let token = issue_bearer_token(&config, &with_aud).unwrap();
        assert!(BearerValidator::new(&config).validate(&token).is_ok());
    }

    #[test]
    fn test_garbage_token() {
        let err = BearerValidator::new(&config())
            .validate("not-a-jwt")
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));
    }
}
