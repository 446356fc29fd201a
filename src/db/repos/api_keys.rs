use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{ApiKey, CreateApiKey},
};

#[async_trait]
pub trait ApiKeyRepo: Send + Sync {
    /// Store a key. Only the hash and a short display prefix are persisted.
    async fn create(&self, input: CreateApiKey, key_prefix: &str, key_hash: &str)
    -> DbResult<ApiKey>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>>;

    /// Look up by SHA-256 hash, whatever the key's status.
    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>>;

    async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<ApiKey>>;

    /// Returns false when the key was missing or already revoked.
    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<bool>;
}
