use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateUsageLog, UsageLog},
};

#[async_trait]
pub trait UsageRepo: Send + Sync {
    /// Insert a usage row with a null cost.
    async fn create(&self, input: CreateUsageLog) -> DbResult<UsageLog>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<UsageLog>>;

    /// Rows still waiting for a cost, oldest first.
    async fn list_unpriced(&self, limit: u32) -> DbResult<Vec<UsageLog>>;

    /// Most recent rows of a user, newest first.
    async fn list_by_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<UsageLog>>;

    /// Sum of recorded costs for a user.
    async fn total_cost_for_user(&self, user_id: &str) -> DbResult<i64>;
}
