use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateUser, User},
};

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user. Fails with `Conflict` when the id is taken.
    async fn create(&self, input: CreateUser) -> DbResult<User>;

    async fn get(&self, user_id: &str) -> DbResult<Option<User>>;

    /// Top up (or, with a negative amount, claw back) the credit balance.
    /// Returns the updated user, or `NotFound`.
    async fn add_credit(&self, user_id: &str, amount: i64) -> DbResult<User>;

    async fn set_blocked(&self, user_id: &str, blocked: bool) -> DbResult<User>;
}
