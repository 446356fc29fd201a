//! Shared tests for ApiKeyRepo implementations

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::{DbError, DbPool},
    models::{ApiKeyStatus, CreateApiKey, CreateUser, generate_secret_with_prefix},
};

async fn seed_user(db: &DbPool, user_id: &str) {
    db.users()
        .create(CreateUser::new(user_id))
        .await
        .expect("seed user");
}

fn key_input(user_id: &str) -> CreateApiKey {
    CreateApiKey {
        user_id: user_id.to_string(),
        name: "ci".to_string(),
        scope: Some("chat".to_string()),
        expires_at: None,
    }
}

pub(super) async fn test_create_and_lookup_by_hash(db: &DbPool) {
    seed_user(db, "alice").await;
    let (raw, hash) = generate_secret_with_prefix("gw_live_");

    let created = db
        .api_keys()
        .create(key_input("alice"), &raw[..12], &hash)
        .await
        .expect("create key");
    assert_eq!(created.user_id, "alice");
    assert_eq!(created.scope.as_deref(), Some("chat"));

    let found = db
        .api_keys()
        .get_by_hash(&hash)
        .await
        .expect("lookup")
        .expect("found");
    assert_eq!(found.id, created.id);
    assert_eq!(found.key_prefix, &raw[..12]);
    assert_eq!(found.status(Utc::now()), ApiKeyStatus::Active);
}

pub(super) async fn test_lookup_unknown_hash(db: &DbPool) {
    assert!(db.api_keys().get_by_hash("0000").await.unwrap().is_none());
    assert!(db.api_keys().get_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

pub(super) async fn test_duplicate_hash_conflicts(db: &DbPool) {
    seed_user(db, "alice").await;
    let repo = db.api_keys();
    repo.create(key_input("alice"), "gw_live_a", "hash").await.unwrap();
    let err = repo
        .create(key_input("alice"), "gw_live_b", "hash")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
}

pub(super) async fn test_revoke(db: &DbPool) {
    seed_user(db, "alice").await;
    let repo = db.api_keys();
    let key = repo.create(key_input("alice"), "gw_live_a", "h1").await.unwrap();

    assert!(repo.revoke(key.id, Utc::now()).await.unwrap());
    assert!(!repo.revoke(key.id, Utc::now()).await.unwrap());

    let revoked = repo.get_by_id(key.id).await.unwrap().unwrap();
    assert!(!revoked.is_active);
    assert!(revoked.revoked_at.is_some());
    assert_eq!(revoked.status(Utc::now()), ApiKeyStatus::Revoked);
}

pub(super) async fn test_expiry_round_trips(db: &DbPool) {
    seed_user(db, "alice").await;
    let expires_at = Utc::now() - Duration::minutes(1);
    let input = CreateApiKey {
        expires_at: Some(expires_at),
        ..key_input("alice")
    };
    let key = db.api_keys().create(input, "gw_live_a", "h1").await.unwrap();
    let fetched = db.api_keys().get_by_id(key.id).await.unwrap().unwrap();
    assert_eq!(fetched.status(Utc::now()), ApiKeyStatus::Expired);
}

pub(super) async fn test_list_by_user(db: &DbPool) {
    seed_user(db, "alice").await;
    seed_user(db, "bob").await;
    let repo = db.api_keys();
    repo.create(key_input("alice"), "p", "h1").await.unwrap();
    repo.create(key_input("alice"), "p", "h2").await.unwrap();
    repo.create(key_input("bob"), "p", "h3").await.unwrap();

    assert_eq!(repo.list_by_user("alice").await.unwrap().len(), 2);
    assert_eq!(repo.list_by_user("bob").await.unwrap().len(), 1);
    assert!(repo.list_by_user("carol").await.unwrap().is_empty());
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

    sqlite_test!(test_create_and_lookup_by_hash);
    sqlite_test!(test_lookup_unknown_hash);
    sqlite_test!(test_duplicate_hash_conflicts);
    sqlite_test!(test_revoke);
    sqlite_test!(test_expiry_round_trips);
    sqlite_test!(test_list_by_user);
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

    postgres_test!(test_create_and_lookup_by_hash);
    postgres_test!(test_lookup_unknown_hash);
    postgres_test!(test_duplicate_hash_conflicts);
    postgres_test!(test_revoke);
    postgres_test!(test_expiry_round_trips);
    postgres_test!(test_list_by_user);
}
