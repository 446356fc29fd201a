use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{Budget, BudgetResetLog, CreateBudget},
};

#[async_trait]
pub trait BudgetRepo: Send + Sync {
    /// Create a budget with `remaining = limit` for the period containing
    /// `now`.
    async fn create(&self, input: CreateBudget, now: DateTime<Utc>) -> DbResult<Budget>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Budget>>;

    /// Active budgets that apply to a charge by `user_id`, optionally
    /// through `api_key_id`.
    async fn list_in_scope(&self, user_id: &str, api_key_id: Option<Uuid>)
    -> DbResult<Vec<Budget>>;

    /// Active budgets ordered by id, starting strictly after `after`.
    async fn list_active_page(&self, after: Option<Uuid>, limit: u32) -> DbResult<Vec<Budget>>;

    async fn set_active(&self, id: Uuid, is_active: bool) -> DbResult<bool>;

    /// Refill a budget for `period_key`.
    ///
    /// One transaction: append the reset log (skipped if a log for this
    /// `(budget, period_key)` already exists), and only if it was appended
    /// set `remaining = limit` and `period_key`. Returns the appended log,
    /// or `None` when another run already reset this period.
    async fn reset(
        &self,
        id: Uuid,
        period_key: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<BudgetResetLog>>;

    async fn list_reset_logs(&self, budget_id: Uuid) -> DbResult<Vec<BudgetResetLog>>;
}
