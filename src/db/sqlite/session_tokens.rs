use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use super::common::{map_unique_violation, parse_uuid};
use crate::{
    db::{error::DbResult, repos::SessionTokenRepo},
    models::{CreateSessionToken, RefreshSessionToken, SessionToken},
};

const SESSION_COLUMNS: &str = "id, user_id, provider_token, access_token_plain, metadata, \
                               expires_at, revoked_at, created_at, updated_at";

pub struct SqliteSessionTokenRepo {
    pool: SqlitePool,
}

impl SqliteSessionTokenRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> DbResult<SessionToken> {
        let metadata: String = row.get("metadata");
        Ok(SessionToken {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_id: row.get("user_id"),
            provider_token: row.get("provider_token"),
            access_token_plain: row.get("access_token_plain"),
            metadata: serde_json::from_str(&metadata)?,
            expires_at: row.get("expires_at"),
            revoked_at: row.get("revoked_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SessionTokenRepo for SqliteSessionTokenRepo {
    async fn create(&self, input: CreateSessionToken, token_hash: &str) -> DbResult<SessionToken> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        let metadata = input
            .metadata
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        sqlx::query(
            r#"
            INSERT INTO session_tokens (
                id, user_id, token_hash, provider_token, access_token_plain, metadata,
                expires_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.user_id)
        .bind(token_hash)
        .bind(&input.provider_token)
        .bind(&input.access_token_plain)
        .bind(serde_json::to_string(&metadata)?)
        .bind(input.expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || "Session token hash already exists".to_string()))?;

        Ok(SessionToken {
            id,
            user_id: input.user_id,
            provider_token: input.provider_token,
            access_token_plain: input.access_token_plain,
            metadata,
            expires_at: input.expires_at,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<SessionToken>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM session_tokens WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn get_by_hash(&self, token_hash: &str) -> DbResult<Option<SessionToken>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM session_tokens WHERE token_hash = ?");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn refresh(
        &self,
        id: Uuid,
        input: RefreshSessionToken,
        now: DateTime<Utc>,
    ) -> DbResult<Option<SessionToken>> {
        let metadata = input
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let query = format!(
            r#"
            UPDATE session_tokens
            SET provider_token = COALESCE(?, provider_token),
                access_token_plain = COALESCE(?, access_token_plain),
                metadata = COALESCE(?, metadata),
                expires_at = COALESCE(?, expires_at),
                updated_at = ?
            WHERE id = ? AND revoked_at IS NULL AND expires_at > ?
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(&input.provider_token)
            .bind(&input.access_token_plain)
            .bind(metadata)
            .bind(input.expires_at)
            .bind(now)
            .bind(id.to_string())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE session_tokens
            SET revoked_at = ?, updated_at = ?
            WHERE id = ? AND revoked_at IS NULL AND expires_at > ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
