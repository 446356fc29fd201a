use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use super::common::{map_unique_violation, parse_uuid};
use crate::{
    db::{error::DbResult, repos::ApiKeyRepo},
    models::{ApiKey, CreateApiKey},
};

const API_KEY_COLUMNS: &str =
    "id, user_id, key_prefix, name, scope, is_active, revoked_at, expires_at, created_at";

pub struct SqliteApiKeyRepo {
    pool: SqlitePool,
}

impl SqliteApiKeyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> DbResult<ApiKey> {
        Ok(ApiKey {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_id: row.get("user_id"),
            key_prefix: row.get("key_prefix"),
            name: row.get("name"),
            scope: row.get("scope"),
            is_active: row.get("is_active"),
            revoked_at: row.get("revoked_at"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl ApiKeyRepo for SqliteApiKeyRepo {
    async fn create(
        &self,
        input: CreateApiKey,
        key_prefix: &str,
        key_hash: &str,
    ) -> DbResult<ApiKey> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, user_id, key_prefix, key_hash, name, scope, is_active, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.user_id)
        .bind(key_prefix)
        .bind(key_hash)
        .bind(&input.name)
        .bind(&input.scope)
        .bind(input.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || "API key hash already exists".to_string()))?;

        Ok(ApiKey {
            id,
            user_id: input.user_id,
            key_prefix: key_prefix.to_string(),
            name: input.name,
            scope: input.scope,
            is_active: true,
            revoked_at: None,
            expires_at: input.expires_at,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_api_key).transpose()
    }

    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = ?");
        let row = sqlx::query(&query)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_api_key).transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<ApiKey>> {
        let query = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE user_id = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_api_key).collect()
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET is_active = 0, revoked_at = ?
            WHERE id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
