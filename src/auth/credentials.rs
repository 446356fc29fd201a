use axum::http::{HeaderMap, header::AUTHORIZATION};

use super::AuthError;
use crate::config::AuthConfig;

/// Raw credentials presented with a request, at most one of each kind.
///
/// Nothing here is verified; that is the resolver's job.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    pub master_key: Option<String>,
    pub api_key: Option<String>,
    pub bearer: Option<String>,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl CredentialBundle {
    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.master_key.is_none()
            && self.api_key.is_none()
            && self.bearer.is_none()
            && self.session_token.is_none()
    }

    /// Collect credentials from request headers.
    ///
    /// - the master key header and the API key header (names from config)
    /// - `Authorization: Bearer <token>`: tokens starting with the API key
    ///   prefix are API keys, anything else is a JWT
    /// - the session token header
    ///
    /// A header that is present but unreadable, or an `Authorization`
    /// header with another scheme, fails with `InvalidCredential` rather
    /// than being skipped.
    pub fn from_headers(headers: &HeaderMap, config: &AuthConfig) -> Result<Self, AuthError> {
        let mut bundle = Self {
            master_key: header_value(headers, &config.master_key_header)?,
            api_key: header_value(headers, &config.api_key.header_name)?,
            bearer: None,
            session_token: header_value(headers, &config.session.header_name)?,
        };

        if let Some(value) = header_value(headers, AUTHORIZATION.as_str())? {
            let token = strip_bearer(&value).ok_or(AuthError::InvalidCredential)?;

            if token.starts_with(config.api_key.key_prefix.as_str()) {
                match &bundle.api_key {
                    Some(existing) if existing != token => {
                        tracing::debug!("Conflicting API keys in headers");
                        return Err(AuthError::InvalidCredential);
                    }
                    Some(_) => {}
                    None => bundle.api_key = Some(token.to_string()),
                }
            } else {
                bundle.bearer = Some(token.to_string());
            }
        }

        Ok(bundle)
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidCredential)?
        .trim();
    if value.is_empty() {
        return Err(AuthError::InvalidCredential);
    }
    Ok(Some(value.to_string()))
}

/// Case-insensitive `Bearer ` scheme strip; `None` for other schemes or an
/// empty token.
fn strip_bearer(value: &str) -> Option<&str> {
    let scheme = value.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = value.get(7..)?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_empty_headers() {
        let bundle = CredentialBundle::from_headers(&HeaderMap::new(), &AuthConfig::default())
            .unwrap();
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_api_key_header() {
        let bundle = CredentialBundle::from_headers(
            &headers(&[("x-api-key", "gw_live_abc")]),
            &AuthConfig::default(),
        )
        .unwrap();
        assert_eq!(bundle.api_key.as_deref(), Some("gw_live_abc"));
        assert!(bundle.bearer.is_none());
    }

    #[test]
    fn test_bearer_with_key_prefix_is_api_key() {
        let bundle = CredentialBundle::from_headers(
            &headers(&[("authorization", "Bearer gw_live_abc")]),
            &AuthConfig::default(),
        )
        .unwrap();
        assert_eq!(bundle.api_key.as_deref(), Some("gw_live_abc"));
        assert!(bundle.bearer.is_none());
    }

    #[test]
    fn test_bearer_jwt() {
        let bundle = CredentialBundle::from_headers(
            &headers(&[("authorization", "bearer eyJhbGciOi.x.y")]),
            &AuthConfig::default(),
        )
        .unwrap();
        assert_eq!(bundle.bearer.as_deref(), Some("eyJhbGciOi.x.y"));
    }

    #[test]
    fn test_all_kinds_collected() {
        let bundle = CredentialBundle::from_headers(
            &headers(&[
                ("x-master-key", "sk-master"),
                ("x-session-token", "gw_sess_abc"),
                ("authorization", "Bearer eyJ.a.b"),
            ]),
            &AuthConfig::default(),
        )
        .unwrap();
        assert_eq!(bundle.master_key.as_deref(), Some("sk-master"));
        assert_eq!(bundle.session_token.as_deref(), Some("gw_sess_abc"));
        assert_eq!(bundle.bearer.as_deref(), Some("eyJ.a.b"));
    }

    #[test]
    fn test_other_scheme_rejected() {
        let result = CredentialBundle::from_headers(
            &headers(&[("authorization", "Basic dXNlcjpwYXNz")]),
            &AuthConfig::default(),
        );
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_empty_bearer_rejected() {
        let result = CredentialBundle::from_headers(
            &headers(&[("authorization", "Bearer ")]),
            &AuthConfig::default(),
        );
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_conflicting_api_keys_rejected() {
        let result = CredentialBundle::from_headers(
            &headers(&[
                ("x-api-key", "gw_live_one"),
                ("authorization", "Bearer gw_live_two"),
            ]),
            &AuthConfig::default(),
        );
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let bundle = CredentialBundle::default().with_api_key("gw_live_secret");
        let debug = format!("{bundle:?}");
        assert!(!debug.contains("gw_live_secret"));
        assert!(debug.contains("REDACTED"));
    }
}
