use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::error::{DbError, DbResult};

/// Reject amounts that would move spend backwards.
pub fn check_amount(amount: i64) -> DbResult<()> {
    if amount < 0 {
        return Err(DbError::Validation(format!(
            "amount must be non-negative, got {amount}"
        )));
    }
    Ok(())
}

/// Money mutations. Every method is one short transaction made of
/// conditional or increment-style updates; nothing reads a balance and
/// writes it back.
#[async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Write `cost` onto a usage row whose cost is still null.
    /// Returns whether the write applied. Negative costs are a `Validation` error.
    async fn set_usage_cost(&self, usage_id: Uuid, cost: i64, now: DateTime<Utc>)
    -> DbResult<bool>;

    /// `spend_total += amount`, `credit_balance -= amount`, and
    /// `remaining -= amount` on every active budget in scope.
    /// `NotFound` when the user does not exist, `Validation` when `amount`
    /// is negative.
    async fn add_user_spend(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()>;

    /// `set_usage_cost` and `add_user_spend` in one transaction; spend is
    /// only added when the cost write applied. Returns whether it did.
    async fn charge(
        &self,
        usage_id: Uuid,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;
}
