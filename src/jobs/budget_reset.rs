//! Budget reset worker.
//!
//! On every tick the worker pages through active budgets by id and refills
//! each one whose stored `period_key` is behind the period containing
//! `now`. The refill and its reset log are written in one transaction keyed
//! by `(budget_id, period_key)`, so several workers (or processes) can run
//! at once and each period is still refilled exactly once.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::BudgetResetConfig,
    db::{DbPool, DbResult},
};

/// Results from a single reset run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BudgetResetRunResult {
    /// Active budgets looked at.
    pub examined: u64,
    /// Budgets refilled by this run (or that would be, in dry-run mode).
    pub reset: u64,
    /// Budgets whose period had rolled over but which another run refilled first.
    pub already_reset: u64,
    /// Budgets whose refill failed; they are retried on the next tick.
    pub failed: u64,
    pub duration_ms: u64,
}

impl BudgetResetRunResult {
    pub fn has_resets(&self) -> bool {
        self.reset > 0
    }
}

/// Starts the budget reset worker as a background task.
///
/// The worker runs in a loop at the configured interval until the task is
/// cancelled.
pub async fn start_budget_reset_worker(db: Arc<DbPool>, config: BudgetResetConfig) {
    if !config.enabled {
        tracing::info!("Budget reset worker disabled by configuration");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(
        interval_secs = config.interval_secs,
        batch_size = config.batch_size,
        dry_run = config.dry_run,
        "Starting budget reset worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    loop {
        match run_budget_reset(&db, &config, Utc::now()).await {
            Ok(result) => {
                if result.has_resets() || result.failed > 0 {
                    tracing::info!(
                        examined = result.examined,
                        reset = result.reset,
                        already_reset = result.already_reset,
                        failed = result.failed,
                        duration_ms = result.duration_ms,
                        dry_run = config.dry_run,
                        "Budget reset run complete{}",
                        dry_run_msg
                    );
                } else {
                    tracing::debug!(
                        examined = result.examined,
                        "Budget reset run complete, nothing to reset"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error running budget reset");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Run a single pass over every active budget as of `now`.
///
/// Failing to list budgets aborts the pass. A failed refill is counted and
/// the pass moves on.
pub async fn run_budget_reset(
    db: &DbPool,
    config: &BudgetResetConfig,
    now: DateTime<Utc>,
) -> DbResult<BudgetResetRunResult> {
    let start = Instant::now();
    let mut result = BudgetResetRunResult::default();
    let repo = db.budgets();
    let mut after = None;

    loop {
        let page = repo.list_active_page(after, config.batch_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);
        let page_len = page.len();

        for budget in page {
            result.examined += 1;
            if !budget.needs_reset(now) {
                continue;
            }

            let current_key = budget.current_period_key(now);

            if config.dry_run {
                tracing::info!(
                    budget_id = %budget.id,
                    scope = budget.scope.scope_type(),
                    scope_id = %budget.scope.scope_id(),
                    from_period = %budget.period_key,
                    to_period = %current_key,
                    remaining = budget.remaining,
                    limit = budget.limit,
                    "DRY RUN: Would reset budget"
                );
                result.reset += 1;
                continue;
            }

            match repo.reset(budget.id, &current_key, now).await {
                Ok(Some(log)) => {
                    tracing::info!(
                        budget_id = %budget.id,
                        period = %budget.period,
                        period_key = %log.period_key,
                        previous_remaining = log.previous_remaining,
                        new_remaining = log.new_remaining,
                        "Budget reset"
                    );
                    result.reset += 1;
                }
                Ok(None) => {
                    tracing::debug!(
                        budget_id = %budget.id,
                        period_key = %current_key,
                        "Budget already reset for period"
                    );
                    result.already_reset += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        budget_id = %budget.id,
                        period_key = %current_key,
                        error = %e,
                        "Failed to reset budget"
                    );
                    result.failed += 1;
                }
            }
        }

        if page_len < config.batch_size as usize {
            break;
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_default() {
        let result = BudgetResetRunResult::default();
        assert!(!result.has_resets());
        assert_eq!(result.examined, 0);
    }

    #[cfg(feature = "database-sqlite")]
    mod sqlite {
        use chrono::{Duration, TimeZone};

        use super::*;
        use crate::{
            db::tests::harness::create_sqlite_db,
            models::{BudgetPeriod, BudgetScope, CreateBudget, CreateUser},
        };

        fn config(batch_size: u32, dry_run: bool) -> BudgetResetConfig {
            BudgetResetConfig {
                batch_size,
                dry_run,
                ..Default::default()
            }
        }

        fn monthly(user_id: &str, limit: i64) -> CreateBudget {
            CreateBudget {
                scope: BudgetScope::User(user_id.to_string()),
                limit,
                period: BudgetPeriod::Monthly,
            }
        }

        fn may() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap()
        }

        fn june() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 1).unwrap()
        }

        #[tokio::test]
        async fn test_rolled_over_budget_is_refilled() {
            let db = create_sqlite_db().await;
            db.users()
                .create(CreateUser::new("alice").with_credit(10_000_000))
                .await
                .unwrap();
            let budget = db
                .budgets()
                .create(monthly("alice", 1_000_000), may())
                .await
                .unwrap();
            db.ledger()
                .add_user_spend("alice", None, 1_500_000, may())
                .await
                .unwrap();
            let drained = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
            assert_eq!(drained.remaining, -500_000);

            let result = run_budget_reset(&db, &config(500, false), june())
                .await
                .unwrap();
            assert_eq!(result.examined, 1);
            assert_eq!(result.reset, 1);

            let refilled = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
            assert_eq!(refilled.remaining, 1_000_000);
            assert_eq!(refilled.period_key, "2024-06");
        }

        #[tokio::test]
        async fn test_two_runs_write_one_log() {
            let db = create_sqlite_db().await;
            let budget = db
                .budgets()
                .create(monthly("alice", 1_000_000), may())
                .await
                .unwrap();

            let first = run_budget_reset(&db, &config(500, false), june())
                .await
                .unwrap();
            let second = run_budget_reset(&db, &config(500, false), june())
                .await
                .unwrap();

            assert_eq!(first.reset, 1);
            assert_eq!(second.reset, 0);
            assert_eq!(second.examined, 1);

            let logs = db.budgets().list_reset_logs(budget.id).await.unwrap();
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].period_key, "2024-06");
        }

        #[tokio::test]
        async fn test_current_period_untouched() {
            let db = create_sqlite_db().await;
            let budget = db
                .budgets()
                .create(monthly("alice", 1_000_000), may())
                .await
                .unwrap();

            let result = run_budget_reset(&db, &config(500, false), may() + Duration::days(1))
                .await
                .unwrap();
            assert_eq!(result.examined, 1);
            assert_eq!(result.reset, 0);
            assert!(db.budgets().list_reset_logs(budget.id).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_dry_run_writes_nothing() {
            let db = create_sqlite_db().await;
            let budget = db
                .budgets()
                .create(monthly("alice", 1_000_000), may())
                .await
                .unwrap();

            let result = run_budget_reset(&db, &config(500, true), june())
                .await
                .unwrap();
            assert_eq!(result.reset, 1);

            let unchanged = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
            assert_eq!(unchanged.period_key, "2024-05");
            assert!(db.budgets().list_reset_logs(budget.id).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_pages_through_every_budget() {
            let db = create_sqlite_db().await;
            for i in 0..7 {
                db.budgets()
                    .create(monthly(&format!("user-{i}"), 100), may())
                    .await
                    .unwrap();
            }
            let inactive = db
                .budgets()
                .create(monthly("paused", 100), may())
                .await
                .unwrap();
            db.budgets().set_active(inactive.id, false).await.unwrap();

            let result = run_budget_reset(&db, &config(3, false), june())
                .await
                .unwrap();
            assert_eq!(result.examined, 7);
            assert_eq!(result.reset, 7);
            assert!(db.budgets().list_reset_logs(inactive.id).await.unwrap().is_empty());
        }
    }
}
