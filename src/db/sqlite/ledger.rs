use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::{
    error::{DbError, DbResult},
    repos::{LedgerRepo, check_amount},
};

pub struct SqliteLedgerRepo {
    pool: SqlitePool,
}

impl SqliteLedgerRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn apply_cost(
        conn: &mut SqliteConnection,
        usage_id: Uuid,
        cost: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE usage_logs
            SET cost = ?, reconciled_at = ?
            WHERE id = ? AND cost IS NULL
            "#,
        )
        .bind(cost)
        .bind(now)
        .bind(usage_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_spend(
        conn: &mut SqliteConnection,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET spend_total = spend_total + ?,
                credit_balance = credit_balance - ?,
                updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(amount)
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE budgets
            SET remaining = remaining - ?, updated_at = ?
            WHERE is_active = 1
              AND ((scope_type = 'user' AND scope_id = ?)
                OR (scope_type = 'api_key' AND scope_id = ?))
            "#,
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .bind(api_key_id.map(|id| id.to_string()))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LedgerRepo for SqliteLedgerRepo {
    async fn set_usage_cost(
        &self,
        usage_id: Uuid,
        cost: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        check_amount(cost)?;
        let mut conn = self.pool.acquire().await?;
        Self::apply_cost(&mut conn, usage_id, cost, now).await
    }

    async fn add_user_spend(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        check_amount(amount)?;
        let mut tx = self.pool.begin().await?;
        Self::apply_spend(&mut tx, user_id, api_key_id, amount, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn charge(
        &self,
        usage_id: Uuid,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        check_amount(amount)?;
        let mut tx = self.pool.begin().await?;

        if !Self::apply_cost(&mut tx, usage_id, amount, now).await? {
            tx.commit().await?;
            return Ok(false);
        }

        Self::apply_spend(&mut tx, user_id, api_key_id, amount, now).await?;
        tx.commit().await?;
        Ok(true)
    }
}
