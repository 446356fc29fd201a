use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;
use validator::Validate;

use super::common::map_unique_violation;
use crate::{
    db::{error::DbResult, repos::SessionTokenRepo},
    models::{CreateSessionToken, RefreshSessionToken, SessionToken},
};

const SESSION_COLUMNS: &str = "id, user_id, provider_token, access_token_plain, metadata, \
                               expires_at, revoked_at, created_at, updated_at";

pub struct PostgresSessionTokenRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresSessionTokenRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_session(row: &sqlx::postgres::PgRow) -> SessionToken {
        SessionToken {
            id: row.get("id"),
            user_id: row.get("user_id"),
            provider_token: row.get("provider_token"),
            access_token_plain: row.get("access_token_plain"),
            metadata: row.get("metadata"),
            expires_at: row.get("expires_at"),
            revoked_at: row.get("revoked_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl SessionTokenRepo for PostgresSessionTokenRepo {
    async fn create(&self, input: CreateSessionToken, token_hash: &str) -> DbResult<SessionToken> {
        input.validate()?;
        let metadata = input
            .metadata
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        let query = format!(
            r#"
            INSERT INTO session_tokens (
                id, user_id, token_hash, provider_token, access_token_plain, metadata, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&input.user_id)
            .bind(token_hash)
            .bind(&input.provider_token)
            .bind(&input.access_token_plain)
            .bind(&metadata)
            .bind(input.expires_at)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| {
                map_unique_violation(e, || "Session token hash already exists".to_string())
            })?;

        Ok(Self::row_to_session(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<SessionToken>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM session_tokens WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_session))
    }

    async fn get_by_hash(&self, token_hash: &str) -> DbResult<Option<SessionToken>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM session_tokens WHERE token_hash = $1");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_session))
    }

    async fn refresh(
        &self,
        id: Uuid,
        input: RefreshSessionToken,
        now: DateTime<Utc>,
    ) -> DbResult<Option<SessionToken>> {
        let query = format!(
            r#"
            UPDATE session_tokens
            SET provider_token = COALESCE($1, provider_token),
                access_token_plain = COALESCE($2, access_token_plain),
                metadata = COALESCE($3, metadata),
                expires_at = COALESCE($4, expires_at),
                updated_at = $5
            WHERE id = $6 AND revoked_at IS NULL AND expires_at > $5
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(&input.provider_token)
            .bind(&input.access_token_plain)
            .bind(&input.metadata)
            .bind(input.expires_at)
            .bind(now)
            .bind(id)
            .fetch_optional(&self.write_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_session))
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE session_tokens
            SET revoked_at = $1, updated_at = $1
            WHERE id = $2 AND revoked_at IS NULL AND expires_at > $1
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
