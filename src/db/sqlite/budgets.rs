use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::BudgetRepo,
    },
    models::{Budget, BudgetPeriod, BudgetResetLog, BudgetScope, CreateBudget},
};

const BUDGET_COLUMNS: &str = "id, scope_type, scope_id, limit_amount, remaining, period, \
                              period_secs, period_key, is_active, created_at, updated_at";

pub struct SqliteBudgetRepo {
    pool: SqlitePool,
}

impl SqliteBudgetRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_budget(row: &sqlx::sqlite::SqliteRow) -> DbResult<Budget> {
        let scope_type: String = row.get("scope_type");
        let scope_id: String = row.get("scope_id");
        let period: String = row.get("period");
        let period_secs: Option<i64> = row.get("period_secs");

        Ok(Budget {
            id: parse_uuid(&row.get::<String, _>("id"))?,
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

    fn row_to_reset_log(row: &sqlx::sqlite::SqliteRow) -> DbResult<BudgetResetLog> {
        Ok(BudgetResetLog {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            budget_id: parse_uuid(&row.get::<String, _>("budget_id"))?,
            period_key: row.get("period_key"),
            previous_remaining: row.get("previous_remaining"),
            new_remaining: row.get("new_remaining"),
            reset_at: row.get("reset_at"),
        })
    }
}

#[async_trait]
impl BudgetRepo for SqliteBudgetRepo {
    async fn create(&self, input: CreateBudget, now: DateTime<Utc>) -> DbResult<Budget> {
        input.validate()?;
        let id = Uuid::new_v4();
        let period_key = input.period.key_at(now, now);

        sqlx::query(
            r#"
            INSERT INTO budgets (
                id, scope_type, scope_id, limit_amount, remaining, period, period_secs,
                period_key, is_active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.scope.scope_type())
        .bind(input.scope.scope_id())
        .bind(input.limit)
        .bind(input.limit)
        .bind(input.period.as_str())
        .bind(input.period.period_secs())
        .bind(&period_key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Budget {
            id,
            scope: input.scope,
            limit: input.limit,
            remaining: input.limit,
            period: input.period,
            period_key,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Budget>> {
        let query = format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
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
            WHERE is_active = 1
              AND ((scope_type = 'user' AND scope_id = ?)
                OR (scope_type = 'api_key' AND scope_id = ?))
            ORDER BY created_at, id
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(api_key_id.map(|id| id.to_string()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_budget).collect()
    }

    async fn list_active_page(&self, after: Option<Uuid>, limit: u32) -> DbResult<Vec<Budget>> {
        let query = format!(
            r#"
            SELECT {BUDGET_COLUMNS} FROM budgets
            WHERE is_active = 1 AND (? IS NULL OR id > ?)
            ORDER BY id
            LIMIT ?
            "#
        );
        let after = after.map(|id| id.to_string());
        let rows = sqlx::query(&query)
            .bind(&after)
            .bind(&after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_budget).collect()
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> DbResult<bool> {
        let result = sqlx::query("UPDATE budgets SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset(
        &self,
        id: Uuid,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<BudgetResetLog>> {
        let mut tx = self.pool.begin().await?;
        let log_id = Uuid::new_v4();

        // The upsert's SELECT needs a WHERE clause so SQLite can parse ON CONFLICT.
        let inserted = sqlx::query(
            r#"
            INSERT INTO budget_reset_logs (id, budget_id, period_key, previous_remaining, new_remaining, reset_at)
            SELECT ?, id, ?, remaining, limit_amount, ?
            FROM budgets
            WHERE id = ?
            ON CONFLICT (budget_id, period_key) DO NOTHING
            RETURNING id, budget_id, period_key, previous_remaining, new_remaining, reset_at
            "#,
        )
        .bind(log_id.to_string())
        .bind(period_key)
        .bind(now)
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            let exists = sqlx::query("SELECT 1 FROM budgets WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            tx.commit().await?;
            return match exists {
                Some(_) => Ok(None),
                None => Err(DbError::NotFound),
            };
        };
        let log = Self::row_to_reset_log(&row)?;

        sqlx::query(
            r#"
            UPDATE budgets
            SET remaining = limit_amount, period_key = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(period_key)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(log))
    }

    async fn list_reset_logs(&self, budget_id: Uuid) -> DbResult<Vec<BudgetResetLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, budget_id, period_key, previous_remaining, new_remaining, reset_at
            FROM budget_reset_logs
            WHERE budget_id = ?
            ORDER BY reset_at, id
            "#,
        )
        .bind(budget_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_reset_log).collect()
    }
}
