use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use validator::Validate;

use super::common::map_unique_violation;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::UserRepo,
    },
    models::{CreateUser, User},
};

const USER_COLUMNS: &str =
    "user_id, alias, credit_balance, spend_total, blocked, created_at, updated_at";

pub struct SqliteUserRepo {
    pool: SqlitePool,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
        User {
            user_id: row.get("user_id"),
            alias: row.get("alias"),
            credit_balance: row.get("credit_balance"),
            spend_total: row.get("spend_total"),
            blocked: row.get("blocked"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn create(&self, input: CreateUser) -> DbResult<User> {
        input.validate()?;
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (user_id, alias, credit_balance, spend_total, blocked, created_at, updated_at)
            VALUES (?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.alias)
        .bind(input.credit_balance)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, || format!("User '{}' already exists", input.user_id))
        })?;

        Ok(User {
            user_id: input.user_id,
            alias: input.alias,
            credit_balance: input.credit_balance,
            spend_total: 0,
            blocked: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, user_id: &str) -> DbResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn add_credit(&self, user_id: &str, amount: i64) -> DbResult<User> {
        let query = format!(
            r#"
            UPDATE users
            SET credit_balance = credit_balance + ?, updated_at = ?
            WHERE user_id = ?
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(amount)
            .bind(chrono::Utc::now())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(Self::row_to_user(&row))
    }

    async fn set_blocked(&self, user_id: &str, blocked: bool) -> DbResult<User> {
        let query = format!(
            r#"
            UPDATE users
            SET blocked = ?, updated_at = ?
            WHERE user_id = ?
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(blocked)
            .bind(chrono::Utc::now())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(Self::row_to_user(&row))
    }
}
