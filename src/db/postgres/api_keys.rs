use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;
use validator::Validate;

use super::common::map_unique_violation;
use crate::{
    db::{error::DbResult, repos::ApiKeyRepo},
    models::{ApiKey, CreateApiKey},
};

const API_KEY_COLUMNS: &str =
    "id, user_id, key_prefix, name, scope, is_active, revoked_at, expires_at, created_at";

pub struct PostgresApiKeyRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresApiKeyRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_api_key(row: &sqlx::postgres::PgRow) -> ApiKey {
        ApiKey {
            id: row.get("id"),
            user_id: row.get("user_id"),
            key_prefix: row.get("key_prefix"),
            name: row.get("name"),
            scope: row.get("scope"),
            is_active: row.get("is_active"),
            revoked_at: row.get("revoked_at"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ApiKeyRepo for PostgresApiKeyRepo {
    async fn create(
        &self,
        input: CreateApiKey,
        key_prefix: &str,
        key_hash: &str,
    ) -> DbResult<ApiKey> {
        input.validate()?;

        let query = format!(
            r#"
            INSERT INTO api_keys (id, user_id, key_prefix, key_hash, name, scope, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {API_KEY_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&input.user_id)
            .bind(key_prefix)
            .bind(key_hash)
            .bind(&input.name)
            .bind(&input.scope)
            .bind(input.expires_at)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| map_unique_violation(e, || "API key hash already exists".to_string()))?;

        Ok(Self::row_to_api_key(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_api_key))
    }

    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1");
        let row = sqlx::query(&query)
            .bind(key_hash)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_api_key))
    }

    async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<ApiKey>> {
        let query = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE user_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.read_pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_api_key).collect())
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET is_active = FALSE, revoked_at = $1
            WHERE id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
