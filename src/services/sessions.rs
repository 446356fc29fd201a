use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult},
    models::{
        CreateSessionToken, CreatedSessionToken, RefreshSessionToken, SessionToken,
        generate_session_token,
    },
};

/// Issues, rotates and revokes session tokens.
///
/// Only the Active -> Active (refresh) and Active -> Revoked transitions
/// are explicit; expiry is derived from `expires_at`.
#[derive(Clone)]
pub struct SessionService {
    db: Arc<DbPool>,
}

impl SessionService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateSessionToken) -> DbResult<CreatedSessionToken> {
        let (raw_token, token_hash) = generate_session_token();
        let session = self.db.session_tokens().create(input, &token_hash).await?;

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            expires_at = %session.expires_at,
            "Session created"
        );

        Ok(CreatedSessionToken {
            session,
            token: raw_token,
        })
    }

    pub async fn get(&self, id: Uuid) -> DbResult<Option<SessionToken>> {
        self.db.session_tokens().get_by_id(id).await
    }

    /// Rotate the provider/access tokens and metadata in place.
    ///
    /// `None` when the session is expired, revoked, or unknown; a new
    /// session has to be issued then.
    pub async fn refresh(
        &self,
        id: Uuid,
        input: RefreshSessionToken,
    ) -> DbResult<Option<SessionToken>> {
        let refreshed = self
            .db
            .session_tokens()
            .refresh(id, input, Utc::now())
            .await?;

        match &refreshed {
            Some(session) => {
                tracing::debug!(session_id = %id, expires_at = %session.expires_at, "Session refreshed")
            }
            None => tracing::debug!(session_id = %id, "Refresh refused for inactive session"),
        }

        Ok(refreshed)
    }

    pub async fn revoke(&self, id: Uuid) -> DbResult<bool> {
        let revoked = self.db.session_tokens().revoke(id, Utc::now()).await?;
        if revoked {
            tracing::info!(session_id = %id, "Session revoked");
        }
        Ok(revoked)
    }
}
