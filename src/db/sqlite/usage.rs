use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use super::common::{parse_optional_uuid, parse_uuid};
use crate::{
    db::{error::DbResult, repos::UsageRepo},
    models::{CreateUsageLog, UsageLog},
};

const USAGE_COLUMNS: &str = "id, user_id, api_key_id, provider, model, endpoint, prompt_tokens, \
                             completion_tokens, cache_tokens, cost, created_at, reconciled_at";

pub struct SqliteUsageRepo {
    pool: SqlitePool,
}

impl SqliteUsageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_usage(row: &sqlx::sqlite::SqliteRow) -> DbResult<UsageLog> {
        Ok(UsageLog {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_id: row.get("user_id"),
            api_key_id: parse_optional_uuid(row.get("api_key_id"))?,
            provider: row.get("provider"),
            model: row.get("model"),
            endpoint: row.get("endpoint"),
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            cache_tokens: row.get("cache_tokens"),
            cost: row.get("cost"),
            created_at: row.get("created_at"),
            reconciled_at: row.get("reconciled_at"),
        })
    }
}

#[async_trait]
impl UsageRepo for SqliteUsageRepo {
    async fn create(&self, input: CreateUsageLog) -> DbResult<UsageLog> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO usage_logs (
                id, user_id, api_key_id, provider, model, endpoint,
                prompt_tokens, completion_tokens, cache_tokens, cost, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.user_id)
        .bind(input.api_key_id.map(|id| id.to_string()))
        .bind(&input.provider)
        .bind(&input.model)
        .bind(&input.endpoint)
        .bind(input.prompt_tokens)
        .bind(input.completion_tokens)
        .bind(input.cache_tokens)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(UsageLog {
            id,
            user_id: input.user_id,
            api_key_id: input.api_key_id,
            provider: input.provider,
            model: input.model,
            endpoint: input.endpoint,
            prompt_tokens: input.prompt_tokens,
            completion_tokens: input.completion_tokens,
            cache_tokens: input.cache_tokens,
            cost: None,
            created_at: now,
            reconciled_at: None,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<UsageLog>> {
        let query = format!("SELECT {USAGE_COLUMNS} FROM usage_logs WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_usage).transpose()
    }

    async fn list_unpriced(&self, limit: u32) -> DbResult<Vec<UsageLog>> {
        let query = format!(
            r#"
            SELECT {USAGE_COLUMNS} FROM usage_logs
            WHERE cost IS NULL
            ORDER BY created_at, id
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_usage).collect()
    }

    async fn list_by_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<UsageLog>> {
        let query = format!(
            r#"
            SELECT {USAGE_COLUMNS} FROM usage_logs
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_usage).collect()
    }

    async fn total_cost_for_user(&self, user_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(cost), 0) FROM usage_logs WHERE user_id = ? AND cost IS NOT NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
