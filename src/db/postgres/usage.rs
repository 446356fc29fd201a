use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{error::DbResult, repos::UsageRepo},
    models::{CreateUsageLog, UsageLog},
};

const USAGE_COLUMNS: &str = "id, user_id, api_key_id, provider, model, endpoint, prompt_tokens, \
                             completion_tokens, cache_tokens, cost, created_at, reconciled_at";

pub struct PostgresUsageRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUsageRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_usage(row: &sqlx::postgres::PgRow) -> UsageLog {
        UsageLog {
            id: row.get("id"),
            user_id: row.get("user_id"),
            api_key_id: row.get("api_key_id"),
            provider: row.get("provider"),
            model: row.get("model"),
            endpoint: row.get("endpoint"),
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            cache_tokens: row.get("cache_tokens"),
            cost: row.get("cost"),
            created_at: row.get("created_at"),
            reconciled_at: row.get("reconciled_at"),
        }
    }
}

#[async_trait]
impl UsageRepo for PostgresUsageRepo {
    async fn create(&self, input: CreateUsageLog) -> DbResult<UsageLog> {
        input.validate()?;

        let query = format!(
            r#"
            INSERT INTO usage_logs (
                id, user_id, api_key_id, provider, model, endpoint,
                prompt_tokens, completion_tokens, cache_tokens
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USAGE_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&input.user_id)
            .bind(input.api_key_id)
            .bind(&input.provider)
            .bind(&input.model)
            .bind(&input.endpoint)
            .bind(input.prompt_tokens)
            .bind(input.completion_tokens)
            .bind(input.cache_tokens)
            .fetch_one(&self.write_pool)
            .await?;

        Ok(Self::row_to_usage(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<UsageLog>> {
        // Read from the primary: callers check a cost they just wrote.
        let query = format!("SELECT {USAGE_COLUMNS} FROM usage_logs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.write_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_usage))
    }

    async fn list_unpriced(&self, limit: u32) -> DbResult<Vec<UsageLog>> {
        let query = format!(
            r#"
            SELECT {USAGE_COLUMNS} FROM usage_logs
            WHERE cost IS NULL
            ORDER BY created_at, id
            LIMIT $1
            "#
        );
        let rows = sqlx::query(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.read_pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_usage).collect())
    }

    async fn list_by_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<UsageLog>> {
        let query = format!(
            r#"
            SELECT {USAGE_COLUMNS} FROM usage_logs
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.read_pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_usage).collect())
    }

    async fn total_cost_for_user(&self, user_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(cost), 0)::BIGINT FROM usage_logs WHERE user_id = $1 AND cost IS NOT NULL",
        )
        .bind(user_id)
        .fetch_one(&self.read_pool)
        .await?;

        Ok(total)
    }
}
