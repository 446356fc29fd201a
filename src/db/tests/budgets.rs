//! Shared tests for BudgetRepo implementations

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    db::{DbError, DbPool},
    models::{BudgetPeriod, BudgetScope, CreateBudget},
};

fn user_budget(user_id: &str, limit: i64, period: BudgetPeriod) -> CreateBudget {
    CreateBudget {
        scope: BudgetScope::User(user_id.to_string()),
        limit,
        period,
    }
}

pub(super) async fn test_create_sets_current_period(db: &DbPool) {
    let now = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
    let budget = db
        .budgets()
        .create(user_budget("alice", 5_000_000, BudgetPeriod::Monthly), now)
        .await
        .expect("create budget");

    assert_eq!(budget.remaining, 5_000_000);
    assert_eq!(budget.period_key, "2024-05");

    let fetched = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
    assert_eq!(fetched.scope, BudgetScope::User("alice".into()));
    assert_eq!(fetched.period, BudgetPeriod::Monthly);
    assert_eq!(fetched.period_key, "2024-05");
}

pub(super) async fn test_custom_period_round_trips(db: &DbPool) {
    let now = Utc::now();
    let budget = db
        .budgets()
        .create(
            user_budget("alice", 100, BudgetPeriod::Custom { period_secs: 3600 }),
            now,
        )
        .await
        .unwrap();
    let fetched = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
    assert_eq!(fetched.period, BudgetPeriod::Custom { period_secs: 3600 });
    assert_eq!(fetched.period_key, "custom-3600-0");
}

pub(super) async fn test_invalid_budget_rejected(db: &DbPool) {
    let err = db
        .budgets()
        .create(user_budget("alice", -1, BudgetPeriod::Daily), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
}

pub(super) async fn test_list_in_scope(db: &DbPool) {
    let now = Utc::now();
    let key_id = Uuid::new_v4();
    let other_key = Uuid::new_v4();
    let repo = db.budgets();

    repo.create(user_budget("alice", 100, BudgetPeriod::Daily), now)
        .await
        .unwrap();
    repo.create(
        CreateBudget {
            scope: BudgetScope::ApiKey(key_id),
            limit: 50,
            period: BudgetPeriod::Daily,
        },
        now,
    )
    .await
    .unwrap();
    repo.create(
        CreateBudget {
            scope: BudgetScope::ApiKey(other_key),
            limit: 50,
            period: BudgetPeriod::Daily,
        },
        now,
    )
    .await
    .unwrap();
    let inactive = repo
        .create(user_budget("alice", 1, BudgetPeriod::Weekly), now)
        .await
        .unwrap();
    repo.set_active(inactive.id, false).await.unwrap();
    repo.create(user_budget("bob", 100, BudgetPeriod::Daily), now)
        .await
        .unwrap();

    assert_eq!(repo.list_in_scope("alice", None).await.unwrap().len(), 1);
    let with_key = repo.list_in_scope("alice", Some(key_id)).await.unwrap();
    assert_eq!(with_key.len(), 2);
    assert!(with_key.iter().any(|b| b.scope == BudgetScope::ApiKey(key_id)));
}

pub(super) async fn test_reset_once_per_period(db: &DbPool) {
    let created = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
    let repo = db.budgets();
    let budget = repo
        .create(user_budget("alice", 1_000, BudgetPeriod::Daily), created)
        .await
        .unwrap();

    let next_day = created + Duration::days(1);
    let first = repo
        .reset(budget.id, "2024-05-18", next_day)
        .await
        .unwrap()
        .expect("first reset applies");
    assert_eq!(first.previous_remaining, 1_000);
    assert_eq!(first.new_remaining, 1_000);
    assert_eq!(first.period_key, "2024-05-18");

    let second = repo.reset(budget.id, "2024-05-18", next_day).await.unwrap();
    assert!(second.is_none());

    let logs = repo.list_reset_logs(budget.id).await.unwrap();
    assert_eq!(logs.len(), 1);

    let stored = repo.get_by_id(budget.id).await.unwrap().unwrap();
    assert_eq!(stored.period_key, "2024-05-18");
}

pub(super) async fn test_reset_restores_limit(db: &DbPool) {
    let created = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
    db.users()
        .create(crate::models::CreateUser::new("alice").with_credit(10_000))
        .await
        .unwrap();
    let budget = db
        .budgets()
        .create(user_budget("alice", 1_000, BudgetPeriod::Daily), created)
        .await
        .unwrap();

    db.ledger()
        .add_user_spend("alice", None, 1_200, created)
        .await
        .unwrap();
    let spent = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
    assert_eq!(spent.remaining, -200);

    let log = db
        .budgets()
        .reset(budget.id, "2024-05-18", created + Duration::days(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.previous_remaining, -200);
    assert_eq!(log.new_remaining, 1_000);

    let refilled = db.budgets().get_by_id(budget.id).await.unwrap().unwrap();
    assert_eq!(refilled.remaining, 1_000);
}

pub(super) async fn test_reset_missing_budget(db: &DbPool) {
    let err = db
        .budgets()
        .reset(Uuid::new_v4(), "2024-05-18", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

pub(super) async fn test_list_active_page(db: &DbPool) {
    let now = Utc::now();
    let repo = db.budgets();
    for i in 0..5 {
        repo.create(user_budget(&format!("user-{i}"), 10, BudgetPeriod::Daily), now)
            .await
            .unwrap();
    }

    let first = repo.list_active_page(None, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    let second = repo.list_active_page(Some(first[1].id), 2).await.unwrap();
    assert_eq!(second.len(), 2);
    let third = repo.list_active_page(Some(second[1].id), 2).await.unwrap();
    assert_eq!(third.len(), 1);

    let mut seen: Vec<Uuid> = first
        .iter()
        .chain(second.iter())
        .chain(third.iter())
        .map(|b| b.id)
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use crate::db::tests::harness::create_sqlite_db;

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let db = create_sqlite_db().await;
                super::$name(&db).await;
            }
        };
    }

    sqlite_test!(test_create_sets_current_period);
    sqlite_test!(test_custom_period_round_trips);
    sqlite_test!(test_invalid_budget_rejected);
    sqlite_test!(test_list_in_scope);
    sqlite_test!(test_reset_once_per_period);
    sqlite_test!(test_reset_restores_limit);
    sqlite_test!(test_reset_missing_budget);
    sqlite_test!(test_list_active_page);
}

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use crate::db::tests::harness::postgres::create_postgres_db;

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let db = create_postgres_db().await;
                super::$name(&db).await;
            }
        };
    }

    postgres_test!(test_create_sets_current_period);
    postgres_test!(test_custom_period_round_trips);
    postgres_test!(test_invalid_budget_rejected);
    postgres_test!(test_list_in_scope);
    postgres_test!(test_reset_once_per_period);
    postgres_test!(test_reset_restores_limit);
    postgres_test!(test_reset_missing_budget);
    postgres_test!(test_list_active_page);
}
