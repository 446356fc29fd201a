use async_trait::async_trait;
use sqlx::{PgPool, Row};
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

pub struct PostgresUserRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
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
impl UserRepo for PostgresUserRepo {
    async fn create(&self, input: CreateUser) -> DbResult<User> {
        input.validate()?;

        let query = format!(
            r#"
            INSERT INTO users (user_id, alias, credit_balance)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(&input.user_id)
            .bind(&input.alias)
            .bind(input.credit_balance)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| {
                map_unique_violation(e, || format!("User '{}' already exists", input.user_id))
            })?;

        Ok(Self::row_to_user(&row))
    }

    async fn get(&self, user_id: &str) -> DbResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn add_credit(&self, user_id: &str, amount: i64) -> DbResult<User> {
        let query = format!(
            r#"
            UPDATE users
            SET credit_balance = credit_balance + $1, updated_at = NOW()
            WHERE user_id = $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(amount)
            .bind(user_id)
            .fetch_optional(&self.write_pool)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(Self::row_to_user(&row))
    }

    async fn set_blocked(&self, user_id: &str, blocked: bool) -> DbResult<User> {
        let query = format!(
            r#"
            UPDATE users
            SET blocked = $1, updated_at = NOW()
            WHERE user_id = $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(blocked)
            .bind(user_id)
            .fetch_optional(&self.write_pool)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(Self::row_to_user(&row))
    }
}
