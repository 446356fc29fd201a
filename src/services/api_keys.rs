use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult},
    models::{
        API_KEY_DISPLAY_PREFIX_LEN, ApiKey, CreateApiKey, CreatedApiKey,
        generate_secret_with_prefix,
    },
};

/// Service layer for API key operations
#[derive(Clone)]
pub struct ApiKeyService {
    db: Arc<DbPool>,
}

impl ApiKeyService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Create a new API key with the given prefix.
    /// Returns both the stored key and the raw key (only shown once).
    pub async fn create(&self, input: CreateApiKey, prefix: &str) -> DbResult<CreatedApiKey> {
        let (raw_key, key_hash) = generate_secret_with_prefix(prefix);
        let display_prefix = raw_key
            .get(..API_KEY_DISPLAY_PREFIX_LEN)
            .unwrap_or(raw_key.as_str());

        let api_key = self
            .db
            .api_keys()
            .create(input, display_prefix, &key_hash)
            .await?;

        tracing::info!(
            api_key_id = %api_key.id,
            user_id = %api_key.user_id,
            "API key created"
        );

        Ok(CreatedApiKey {
            api_key,
            key: raw_key,
        })
    }

    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>> {
        self.db.api_keys().get_by_id(id).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<ApiKey>> {
        self.db.api_keys().list_by_user(user_id).await
    }

    /// Returns false when the key was missing or already revoked.
    pub async fn revoke(&self, id: Uuid) -> DbResult<bool> {
        let revoked = self.db.api_keys().revoke(id, Utc::now()).await?;
        if revoked {
            tracing::info!(api_key_id = %id, "API key revoked");
        }
        Ok(revoked)
    }
}
