use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::{
    error::{DbError, DbResult},
    repos::{LedgerRepo, check_amount},
};

/// Ledger writes always go to the primary.
pub struct PostgresLedgerRepo {
    write_pool: PgPool,
}

impl PostgresLedgerRepo {
    pub fn new(write_pool: PgPool) -> Self {
        Self { write_pool }
    }

    async fn apply_cost(
        conn: &mut PgConnection,
        usage_id: Uuid,
        cost: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE usage_logs
            SET cost = $1, reconciled_at = $2
            WHERE id = $3 AND cost IS NULL
            "#,
        )
        .bind(cost)
        .bind(now)
        .bind(usage_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_spend(
        conn: &mut PgConnection,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET spend_total = spend_total + $1,
                credit_balance = credit_balance - $1,
                updated_at = $2
            WHERE user_id = $3
            "#,
        )
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
            SET remaining = remaining - $1, updated_at = $2
            WHERE is_active
              AND ((scope_type = 'user' AND scope_id = $3)
                OR (scope_type = 'api_key' AND scope_id = $4))
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
impl LedgerRepo for PostgresLedgerRepo {
    async fn set_usage_cost(
        &self,
        usage_id: Uuid,
        cost: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        check_amount(cost)?;
        let mut conn = self.write_pool.acquire().await?;
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
        let mut tx = self.write_pool.begin().await?;
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
        let mut tx = self.write_pool.begin().await?;

        if !Self::apply_cost(&mut tx, usage_id, amount, now).await? {
            tx.commit().await?;
            return Ok(false);
        }

        Self::apply_spend(&mut tx, user_id, api_key_id, amount, now).await?;
        tx.commit().await?;
        Ok(true)
    }
}
