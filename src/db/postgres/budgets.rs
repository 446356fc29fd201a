use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::BudgetRepo,
    },
    models::{Budget, BudgetPeriod, BudgetResetLog, BudgetScope, CreateBudget},
};

const BUDGET_COLUMNS: &str = "id, scope_type, scope_id, limit_amount, remaining, period, \
                              period_secs, period_key, is_active, created_at, updated_at";

pub struct PostgresBudgetRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresBudgetRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_budget(row: &sqlx::postgres::PgRow) -> DbResult<Budget> {
        let scope_type: String = row.get("scope_type");
        let scope_id: String = row.get("scope_id");
        let period: String = row.get("period");
        let period_secs: Option<i64> = row.get("period_secs");

        Ok(Budget {
            id: row.get("id"),
            scope: BudgetScope::from_parts(&scope_type, &scope_id).ok_or_else(|| {
                DbError::Internal(format!("Invalid budget scope '{scope_type}:{scope_id}'"))
            })?,
            limit: row.get("limit_amount"),
            remaining: row.get("remaining"),
            period: BudgetPeriod::from_parts(&period, period_secs)
                .ok_or_else(|| DbError::Internal(format!("Invalid budget period '{period}'")))?,
            period_key: row.get("period_key"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_reset_log(row: &sqlx::postgres::PgRow) -> BudgetResetLog {
        BudgetResetLog {
            id: row.get("id"),
            budget_id: row.get("budget_id"),
            period_key: row.get("period_key"),
            previous_remaining: row.get("previous_remaining"),
            new_remaining: row.get("new_remaining"),
            reset_at: row.get("reset_at"),
        }
    }
}

#[async_trait]
impl BudgetRepo for PostgresBudgetRepo {
    async fn create(&self, input: CreateBudget, now: DateTime<Utc>) -> DbResult<Budget> {
        input.validate()?;
        let period_key = input.period.key_at(now, now);

        let query = format!(
            r#"
            INSERT INTO budgets (
                id, scope_type, scope_id, limit_amount, remaining, period, period_secs,
                period_key, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $4, $5, $6, $7, $8, $8)
            RETURNING {BUDGET_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(input.scope.scope_type())
            .bind(input.scope.scope_id())
            .bind(input.limit)
            .bind(input.period.as_str())
            .bind(input.period.period_secs())
            .bind(&period_key)
            .bind(now)
            .fetch_one(&self.write_pool)
            .await?;

        Self::row_to_budget(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Budget>> {
        let query = format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;

        row.as_ref().map(Self::row_to_budget).transpose()
    }

    async fn list_in_scope(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
    ) -> DbResult<Vec<Budget>> {
        let query = format!(
            r#"
            SELECT {BUDGET_COLUMNS} FROM budgets
            WHERE is_active
              AND ((scope_type = 'user' AND scope_id = $1)
                OR (scope_type = 'api_key' AND scope_id = $2))
            ORDER BY created_at, id
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(api_key_id.map(|id| id.to_string()))
            .fetch_all(&self.read_pool)
            .await?;

        rows.iter().map(Self::row_to_budget).collect()
    }

    async fn list_active_page(&self, after: Option<Uuid>, limit: u32) -> DbResult<Vec<Budget>> {
        let query = format!(
            r#"
            SELECT {BUDGET_COLUMNS} FROM budgets
            WHERE is_active AND ($1::UUID IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&query)
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.read_pool)
            .await?;

        rows.iter().map(Self::row_to_budget).collect()
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE budgets SET is_active = $1, updated_at = NOW() WHERE id = $2")
                .bind(is_active)
                .bind(id)
                .execute(&self.write_pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset(
        &self,
        id: Uuid,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<BudgetResetLog>> {
        let mut tx = self.write_pool.begin().await?;

        // Row lock keeps concurrent charges from landing between the
        // snapshot of `remaining` and the refill.
        let current = sqlx::query(
            "SELECT remaining, limit_amount FROM budgets WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
        let remaining: i64 = current.get("remaining");
        let limit: i64 = current.get("limit_amount");

        let inserted = sqlx::query(
            r#"
            INSERT INTO budget_reset_logs (id, budget_id, period_key, previous_remaining, new_remaining, reset_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (budget_id, period_key) DO NOTHING
            RETURNING id, budget_id, period_key, previous_remaining, new_remaining, reset_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(period_key)
        .bind(remaining)
        .bind(limit)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE budgets
            SET remaining = limit_amount, period_key = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(period_key)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(Self::row_to_reset_log(&row)))
    }

    async fn list_reset_logs(&self, budget_id: Uuid) -> DbResult<Vec<BudgetResetLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, budget_id, period_key, previous_remaining, new_remaining, reset_at
            FROM budget_reset_logs
            WHERE budget_id = $1
            ORDER BY reset_at, id
            "#,
        )
        .bind(budget_id)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_reset_log).collect())
    }
}
