//! Shared tests for UserRepo implementations

use crate::{
    db::{DbError, DbPool},
    models::CreateUser,
};

pub(super) async fn test_create_and_get(db: &DbPool) {
    let repo = db.users();
    let created = repo
        .create(CreateUser::new("alice").with_credit(10_000_000))
        .await
        .expect("create user");

    assert_eq!(created.user_id, "alice");
    assert_eq!(created.credit_balance, 10_000_000);
    assert_eq!(created.spend_total, 0);
    assert!(!created.blocked);

    let fetched = repo.get("alice").await.expect("get").expect("exists");
    assert_eq!(fetched.user_id, created.user_id);
    assert_eq!(fetched.credit_balance, created.credit_balance);
}

pub(super) async fn test_get_missing(db: &DbPool) {
    assert!(db.users().get("nobody").await.expect("get").is_none());
}

pub(super) async fn test_duplicate_conflicts(db: &DbPool) {
    let repo = db.users();
    repo.create(CreateUser::new("alice")).await.expect("first");
    let err = repo.create(CreateUser::new("alice")).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)), "got {err:?}");
}

pub(super) async fn test_invalid_input_rejected(db: &DbPool) {
    let err = db.users().create(CreateUser::new("")).await.unwrap_err();
    assert!(matches!(err, DbError::Validation(_)), "got {err:?}");
}

pub(super) async fn test_add_credit(db: &DbPool) {
    let repo = db.users();
    repo.create(CreateUser::new("alice").with_credit(100)).await.unwrap();

    let user = repo.add_credit("alice", 250).await.expect("top up");
    assert_eq!(user.credit_balance, 350);

    let user = repo.add_credit("alice", -50).await.expect("claw back");
    assert_eq!(user.credit_balance, 300);
    assert_eq!(user.spend_total, 0);
}

pub(super) async fn test_add_credit_missing_user(db: &DbPool) {
    let err = db.users().add_credit("ghost", 1).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

pub(super) async fn test_set_blocked(db: &DbPool) {
    let repo = db.users();
    repo.create(CreateUser::new("alice")).await.unwrap();

    assert!(repo.set_blocked("alice", true).await.unwrap().blocked);
    assert!(repo.get("alice").await.unwrap().unwrap().blocked);
    assert!(!repo.set_blocked("alice", false).await.unwrap().blocked);
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

    sqlite_test!(test_create_and_get);
    sqlite_test!(test_get_missing);
    sqlite_test!(test_duplicate_conflicts);
    sqlite_test!(test_invalid_input_rejected);
    sqlite_test!(test_add_credit);
    sqlite_test!(test_add_credit_missing_user);
    sqlite_test!(test_set_blocked);
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

    postgres_test!(test_create_and_get);
    postgres_test!(test_get_missing);
    postgres_test!(test_duplicate_conflicts);
    postgres_test!(test_invalid_input_rejected);
    postgres_test!(test_add_credit);
    postgres_test!(test_add_credit_missing_user);
    postgres_test!(test_set_blocked);
}
