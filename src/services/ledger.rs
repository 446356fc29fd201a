//! Cost computation and money movement.
//!
//! A usage row's cost is written at most once (`WHERE cost IS NULL`), and
//! spend is only added in the same transaction as a cost write that
//! applied, so retrying a charge never double-charges.

use std::{sync::Arc, time::Instant};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult},
    models::{ModelPricing, TokenUsage, UsageLog},
    pricing::{PricingCatalog, PricingError, compute_cost, dollars_to_microcents},
};

/// What happened when a usage row was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChargeOutcome {
    /// Cost written and spend applied, in microcents.
    Charged { amount: i64 },
    /// The row already carried a cost; nothing changed.
    AlreadyCharged,
    /// The model has no pricing; the row keeps a null cost.
    Unpriced,
}

/// Results from a single reconciliation pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileResult {
    pub examined: u64,
    pub charged: u64,
    pub already_charged: u64,
    pub unpriced: u64,
    pub failed: u64,
    /// Sum of applied charges in microcents.
    pub amount_charged: i64,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct CostLedger {
    db: Arc<DbPool>,
    pricing: PricingCatalog,
    currency_scale: u32,
}

impl CostLedger {
    pub fn new(db: Arc<DbPool>, pricing: PricingCatalog, currency_scale: u32) -> Self {
        Self {
            db,
            pricing,
            currency_scale,
        }
    }

    /// Cost of `usage` under `price`, in microcents.
    pub fn compute_cost(&self, usage: &TokenUsage, price: &ModelPricing) -> Result<i64, PricingError> {
        let dollars = compute_cost(usage, price, self.currency_scale)?;
        dollars_to_microcents(dollars)
    }

    /// Write the cost onto a usage row that has none yet.
    /// Returns whether the write applied.
    pub async fn set_usage_cost(&self, usage_id: Uuid, amount: i64) -> DbResult<bool> {
        let applied = self
            .db
            .ledger()
            .set_usage_cost(usage_id, amount, Utc::now())
            .await?;
        if !applied {
            tracing::debug!(usage_id = %usage_id, "Usage cost already set");
        }
        Ok(applied)
    }

    /// Increment spend and decrement credit and in-scope budgets.
    pub async fn add_user_spend(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
    ) -> DbResult<()> {
        self.db
            .ledger()
            .add_user_spend(user_id, api_key_id, amount, Utc::now())
            .await?;
        tracing::debug!(user_id, amount, "User spend added");
        Ok(())
    }

    /// Set the cost and add the spend in one transaction.
    pub async fn charge(
        &self,
        usage_id: Uuid,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
    ) -> DbResult<ChargeOutcome> {
        let applied = self
            .db
            .ledger()
            .charge(usage_id, user_id, api_key_id, amount, Utc::now())
            .await?;

        if applied {
            tracing::info!(usage_id = %usage_id, user_id, amount, "Usage charged");
            Ok(ChargeOutcome::Charged { amount })
        } else {
            tracing::debug!(usage_id = %usage_id, "Usage already charged, skipping");
            Ok(ChargeOutcome::AlreadyCharged)
        }
    }

    /// Price a recorded row as of its creation time and charge it.
    ///
    /// An unpriced model is not an error here: the row stays at a null
    /// cost for a later reconciliation.
    pub async fn settle_usage(&self, row: &UsageLog) -> Result<ChargeOutcome, PricingError> {
        if row.cost.is_some() {
            return Ok(ChargeOutcome::AlreadyCharged);
        }

        let price = match self
            .pricing
            .resolve_price(&row.provider, &row.model, row.created_at)
            .await
        {
            Ok(price) => price,
            Err(PricingError::UnknownModel { provider, model }) => {
                tracing::warn!(
                    usage_id = %row.id,
                    provider = %provider,
                    model = %model,
                    "No pricing for model, usage left unpriced"
                );
                return Ok(ChargeOutcome::Unpriced);
            }
            Err(e) => return Err(e),
        };

        let amount = self.compute_cost(&row.usage(), &price)?;
        Ok(self
            .charge(row.id, &row.user_id, row.api_key_id, amount)
            .await?)
    }

    /// Settle up to `limit` rows still carrying a null cost, oldest first.
    pub async fn reconcile(&self, limit: u32) -> DbResult<ReconcileResult> {
        let start = Instant::now();
        let mut result = ReconcileResult::default();

        for row in self.db.usage().list_unpriced(limit).await? {
            result.examined += 1;
            match self.settle_usage(&row).await {
                Ok(ChargeOutcome::Charged { amount }) => {
                    result.charged += 1;
                    result.amount_charged = result.amount_charged.saturating_add(amount);
                }
                Ok(ChargeOutcome::AlreadyCharged) => result.already_charged += 1,
                Ok(ChargeOutcome::Unpriced) => result.unpriced += 1,
                Err(e) => {
                    tracing::warn!(usage_id = %row.id, error = %e, "Failed to reconcile usage row");
                    result.failed += 1;
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::{Decimal, dec};

    use super::*;
    use crate::{
        db::tests::harness::create_sqlite_db,
        models::{CreateModelPricing, CreateUsageLog, CreateUser},
    };

    async fn setup() -> (Arc<DbPool>, CostLedger) {
        let db = Arc::new(create_sqlite_db().await);
        db.users()
            .create(CreateUser::new("alice").with_credit(5_000_000))
            .await
            .unwrap();
        let pricing = PricingCatalog::new(db.clone(), None);
        pricing
            .create(CreateModelPricing {
                provider: "openai".into(),
                model: "gpt-4o".into(),
                effective_from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                input_price_per_token: dec!(0.001),
                output_price_per_token: dec!(0.002),
                cache_price_per_token: Decimal::ZERO,
            })
            .await
            .unwrap();
        (db.clone(), CostLedger::new(db, pricing, 6))
    }

    async fn record(db: &DbPool, user_id: &str, model: &str) -> UsageLog {
        db.usage()
            .create(CreateUsageLog {
                user_id: user_id.into(),
                api_key_id: None,
                provider: "openai".into(),
                model: model.into(),
                endpoint: "/v1/chat/completions".into(),
                prompt_tokens: 1000,
                completion_tokens: 500,
                cache_tokens: 0,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_settle_charges_once() {
        let (db, ledger) = setup().await;
        let row = record(&db, "alice", "gpt-4o").await;

        let first = ledger.settle_usage(&row).await.unwrap();
        assert_eq!(first, ChargeOutcome::Charged { amount: 2_000_000 });

        // Stale copy of the row still has a null cost; the conditional
        // write catches the retry.
        let retry = ledger.settle_usage(&row).await.unwrap();
        assert_eq!(retry, ChargeOutcome::AlreadyCharged);

        let user = db.users().get("alice").await.unwrap().unwrap();
        assert_eq!(user.spend_total, 2_000_000);
        assert_eq!(user.credit_balance, 3_000_000);
    }

    #[tokio::test]
    async fn test_settle_unknown_model_keeps_row() {
        let (db, ledger) = setup().await;
        let row = record(&db, "alice", "gpt-9").await;

        assert_eq!(ledger.settle_usage(&row).await.unwrap(), ChargeOutcome::Unpriced);

        let stored = db.usage().get_by_id(row.id).await.unwrap().unwrap();
        assert!(stored.cost.is_none());
        let user = db.users().get("alice").await.unwrap().unwrap();
        assert_eq!(user.spend_total, 0);
    }

    #[tokio::test]
    async fn test_set_usage_cost_then_spend() {
        let (db, ledger) = setup().await;
        let row = record(&db, "alice", "gpt-4o").await;

        assert!(ledger.set_usage_cost(row.id, 2_000_000).await.unwrap());
        assert!(!ledger.set_usage_cost(row.id, 2_000_000).await.unwrap());
        ledger.add_user_spend("alice", None, 2_000_000).await.unwrap();

        let user = db.users().get("alice").await.unwrap().unwrap();
        assert_eq!(user.spend_total, 2_000_000);
    }

    #[tokio::test]
    async fn test_negative_spend_leaves_totals() {
        let (db, ledger) = setup().await;
        ledger.add_user_spend("alice", None, 2_000_000).await.unwrap();

        let err = ledger
            .add_user_spend("alice", None, -1_500_000)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::db::DbError::Validation(_)), "got {err:?}");

        let user = db.users().get("alice").await.unwrap().unwrap();
        assert_eq!(user.spend_total, 2_000_000);
        assert_eq!(user.credit_balance, 3_000_000);
    }

    #[tokio::test]
    async fn test_reconcile_prices_leftovers() {
        let (db, ledger) = setup().await;
        record(&db, "alice", "gpt-4o").await;
        record(&db, "alice", "gpt-4o").await;
        record(&db, "alice", "gpt-9").await;
        record(&db, "ghost", "gpt-4o").await;

        let result = ledger.reconcile(10).await.unwrap();
        assert_eq!(result.examined, 4);
        assert_eq!(result.charged, 2);
        assert_eq!(result.unpriced, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.amount_charged, 4_000_000);

        let user = db.users().get("alice").await.unwrap().unwrap();
        assert_eq!(user.spend_total, 4_000_000);
        assert_eq!(db.usage().total_cost_for_user("alice").await.unwrap(), 4_000_000);

        let again = ledger.reconcile(10).await.unwrap();
        assert_eq!(again.charged, 0);
        assert_eq!(again.examined, 2);
    }

    #[tokio::test]
    async fn test_prices_as_of_row_creation() {
        let (db, ledger) = setup().await;
        ledger
            .pricing
            .create(CreateModelPricing {
                provider: "openai".into(),
                model: "gpt-4o".into(),
                effective_from: Utc::now() + Duration::days(30),
                input_price_per_token: dec!(0.1),
                output_price_per_token: dec!(0.1),
                cache_price_per_token: Decimal::ZERO,
            })
            .await
            .unwrap();

        let row = record(&db, "alice", "gpt-4o").await;
        assert_eq!(
            ledger.settle_usage(&row).await.unwrap(),
            ChargeOutcome::Charged { amount: 2_000_000 }
        );
    }
}
