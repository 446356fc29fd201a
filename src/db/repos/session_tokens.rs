use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateSessionToken, RefreshSessionToken, SessionToken},
};

#[async_trait]
pub trait SessionTokenRepo: Send + Sync {
    async fn create(&self, input: CreateSessionToken, token_hash: &str) -> DbResult<SessionToken>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<SessionToken>>;

    async fn get_by_hash(&self, token_hash: &str) -> DbResult<Option<SessionToken>>;

    /// Replace token fields and metadata, only while the session is Active
    /// at `now`. Returns the refreshed session, or `None` when no Active
    /// session with that id exists.
    async fn refresh(
        &self,
        id: Uuid,
        input: RefreshSessionToken,
        now: DateTime<Utc>,
    ) -> DbResult<Option<SessionToken>>;

    /// Only an active session can be revoked. Returns false when the
    /// session is missing, already revoked, or expired as of `now`.
    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<bool>;
}
