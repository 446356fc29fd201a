use std::sync::Arc;

use crate::{
    db::{DbPool, DbResult},
    models::{CreateUser, User},
};

/// Service layer for user operations
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateUser) -> DbResult<User> {
        let user = self.db.users().create(input).await?;
        tracing::info!(
            user_id = %user.user_id,
            credit_balance = user.credit_balance,
            "User created"
        );
        Ok(user)
    }

    pub async fn get(&self, user_id: &str) -> DbResult<Option<User>> {
        self.db.users().get(user_id).await
    }

    /// Administrative top-up (negative amounts claw credit back).
    pub async fn add_credit(&self, user_id: &str, amount: i64) -> DbResult<User> {
        let user = self.db.users().add_credit(user_id, amount).await?;
        tracing::info!(
            user_id,
            amount,
            credit_balance = user.credit_balance,
            "Credit adjusted"
        );
        Ok(user)
    }

    pub async fn set_blocked(&self, user_id: &str, blocked: bool) -> DbResult<User> {
        let user = self.db.users().set_blocked(user_id, blocked).await?;
        tracing::info!(user_id, blocked, "User block state changed");
        Ok(user)
    }
}
