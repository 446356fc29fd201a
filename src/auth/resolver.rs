use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    AuthError, CredentialBundle,
    jwt::{BearerClaims, BearerValidator},
};
use crate::{
    config::AuthConfig,
    db::DbPool,
    models::{ApiKeyStatus, SessionState, has_valid_prefix, hash_secret, secrets_equal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    MasterKey,
    ApiKey,
    Bearer,
    Session,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::MasterKey => "master_key",
            CredentialKind::ApiKey => "api_key",
            CredentialKind::Bearer => "bearer",
            CredentialKind::Session => "session",
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    /// User the request acts as and is billed to.
    pub user_id: String,
    /// Authenticated with the master key on behalf of `user_id`.
    pub is_master: bool,
    pub kind: CredentialKind,
    pub api_key_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    /// Scope hint carried by the credential, if any.
    pub scope: Option<String>,
}

impl Actor {
    fn owner(user_id: String, kind: CredentialKind) -> Self {
        Self {
            user_id,
            is_master: false,
            kind,
            api_key_id: None,
            session_id: None,
            scope: None,
        }
    }
}

/// One way of turning a credential into an [`Actor`].
///
/// A strategy only looks at its own field of the bundle. `Ok(None)` means
/// the credential was not presented; anything else is final.
#[async_trait]
pub trait CredentialStrategy: Send + Sync {
    fn kind(&self) -> CredentialKind;

    async fn resolve(
        &self,
        bundle: &CredentialBundle,
        target_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Actor>, AuthError>;
}

/// Operator key that may act as any user named explicitly.
pub struct MasterKeyStrategy {
    master_key: Option<String>,
}

impl MasterKeyStrategy {
    pub fn new(master_key: Option<String>) -> Self {
        Self { master_key }
    }
}

#[async_trait]
impl CredentialStrategy for MasterKeyStrategy {
    fn kind(&self) -> CredentialKind {
        CredentialKind::MasterKey
    }

    async fn resolve(
        &self,
        bundle: &CredentialBundle,
        target_user: Option<&str>,
        _now: DateTime<Utc>,
    ) -> Result<Option<Actor>, AuthError> {
        let Some(presented) = bundle.master_key.as_deref() else {
            return Ok(None);
        };

        let Some(expected) = self.master_key.as_deref() else {
            tracing::debug!("Master key presented but none is configured");
            return Err(AuthError::InvalidCredential);
        };

        if !secrets_equal(presented, expected) {
            return Err(AuthError::InvalidCredential);
        }

        let Some(user_id) = target_user else {
            return Err(AuthError::AmbiguousTarget(
                "master key requires an explicit target user".into(),
            ));
        };

        Ok(Some(Actor {
            is_master: true,
            ..Actor::owner(user_id.to_string(), CredentialKind::MasterKey)
        }))
    }
}

pub struct ApiKeyStrategy {
    db: Arc<DbPool>,
    key_prefix: String,
}

impl ApiKeyStrategy {
    pub fn new(db: Arc<DbPool>, key_prefix: impl Into<String>) -> Self {
        Self {
            db,
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl CredentialStrategy for ApiKeyStrategy {
    fn kind(&self) -> CredentialKind {
        CredentialKind::ApiKey
    }

    async fn resolve(
        &self,
        bundle: &CredentialBundle,
        _target_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Actor>, AuthError> {
        let Some(raw_key) = bundle.api_key.as_deref() else {
            return Ok(None);
        };

        if !has_valid_prefix(raw_key, &self.key_prefix) {
            return Err(AuthError::InvalidCredential);
        }

        let key = self
            .db
            .api_keys()
            .get_by_hash(&hash_secret(raw_key))
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        match key.status(now) {
            ApiKeyStatus::Active => {}
            ApiKeyStatus::Revoked => return Err(AuthError::RevokedCredential),
            ApiKeyStatus::Expired => return Err(AuthError::ExpiredCredential),
        }

        Ok(Some(Actor {
            api_key_id: Some(key.id),
            scope: key.scope,
            ..Actor::owner(key.user_id, CredentialKind::ApiKey)
        }))
    }
}

/// HS256 bearer tokens, optionally bound to a session via `sid`.
pub struct BearerStrategy {
    db: Arc<DbPool>,
    validator: Option<BearerValidator>,
}

impl BearerStrategy {
    pub fn new(db: Arc<DbPool>, validator: Option<BearerValidator>) -> Self {
        Self { db, validator }
    }

    async fn check_linked_session(
        &self,
        claims: &BearerClaims,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let session = self
            .db
            .session_tokens()
            .get_by_id(session_id)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        if session.user_id != claims.sub {
            tracing::warn!(
                session_id = %session_id,
                "Bearer token subject does not own its linked session"
            );
            return Err(AuthError::InvalidCredential);
        }

        session_state_result(session.state(now))
    }
}

#[async_trait]
impl CredentialStrategy for BearerStrategy {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Bearer
    }

    async fn resolve(
        &self,
        bundle: &CredentialBundle,
        _target_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Actor>, AuthError> {
        let Some(token) = bundle.bearer.as_deref() else {
            return Ok(None);
        };

        let Some(validator) = &self.validator else {
            tracing::debug!("Bearer token presented but bearer auth is not configured");
            return Err(AuthError::InvalidCredential);
        };

        let claims = validator.validate(token)?;

        if let Some(session_id) = claims.sid {
            self.check_linked_session(&claims, session_id, now).await?;
        }

        Ok(Some(Actor {
            session_id: claims.sid,
            scope: claims.scope,
            ..Actor::owner(claims.sub, CredentialKind::Bearer)
        }))
    }
}

/// Opaque session tokens issued at login.
pub struct SessionTokenStrategy {
    db: Arc<DbPool>,
}

impl SessionTokenStrategy {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStrategy for SessionTokenStrategy {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Session
    }

    async fn resolve(
        &self,
        bundle: &CredentialBundle,
        _target_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Actor>, AuthError> {
        let Some(raw_token) = bundle.session_token.as_deref() else {
            return Ok(None);
        };

        let session = self
            .db
            .session_tokens()
            .get_by_hash(&hash_secret(raw_token))
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        session_state_result(session.state(now))?;

        Ok(Some(Actor {
            session_id: Some(session.id),
            ..Actor::owner(session.user_id, CredentialKind::Session)
        }))
    }
}

fn session_state_result(state: SessionState) -> Result<(), AuthError> {
    match state {
        SessionState::Active => Ok(()),
        SessionState::Expired => Err(AuthError::ExpiredCredential),
        SessionState::Revoked => Err(AuthError::RevokedCredential),
    }
}

/// Ordered credential strategies; the first one whose credential is
/// presented decides the outcome.
pub struct CredentialResolver {
    strategies: Vec<Box<dyn CredentialStrategy>>,
}

impl CredentialResolver {
    pub fn new(strategies: Vec<Box<dyn CredentialStrategy>>) -> Self {
        Self { strategies }
    }

    /// Master key, API key, bearer token, then session token.
    pub fn from_config(config: &AuthConfig, db: Arc<DbPool>) -> Self {
        Self::new(vec![
            Box::new(MasterKeyStrategy::new(config.master_key.clone())),
            Box::new(ApiKeyStrategy::new(
                db.clone(),
                config.api_key.key_prefix.clone(),
            )),
            Box::new(BearerStrategy::new(
                db.clone(),
                config.bearer.as_ref().map(BearerValidator::new),
            )),
            Box::new(SessionTokenStrategy::new(db)),
        ])
    }

    pub async fn resolve(
        &self,
        bundle: &CredentialBundle,
        target_user: Option<&str>,
    ) -> Result<Actor, AuthError> {
        self.resolve_at(bundle, target_user, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        bundle: &CredentialBundle,
        target_user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Actor, AuthError> {
        for strategy in &self.strategies {
            let actor = match strategy.resolve(bundle, target_user, now).await {
                Ok(Some(actor)) => actor,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(kind = %strategy.kind(), error = %e, "Credential rejected");
                    return Err(e);
                }
            };

            if !actor.is_master
                && let Some(target) = target_user
                && target != actor.user_id
            {
                tracing::debug!(
                    kind = %actor.kind,
                    "Explicit target user differs from the credential owner"
                );
                return Err(AuthError::AmbiguousTarget(
                    "target user does not match the credential owner".into(),
                ));
            }

            tracing::debug!(
                kind = %actor.kind,
                user_id = %actor.user_id,
                is_master = actor.is_master,
                "Credential resolved"
            );
            return Ok(actor);
        }

        Err(AuthError::MissingCredential)
    }
}
