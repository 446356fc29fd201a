mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// PostgreSQL pool configuration with optional read replica.
#[cfg(feature = "database-postgres")]
pub struct PgPoolPair {
    /// Primary pool for writes.
    pub write: sqlx::PgPool,
    /// Optional read replica pool. If None, reads use the write pool.
    pub read: Option<sqlx::PgPool>,
}

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    users: Arc<dyn UserRepo>,
    api_keys: Arc<dyn ApiKeyRepo>,
    session_tokens: Arc<dyn SessionTokenRepo>,
    budgets: Arc<dyn BudgetRepo>,
    model_pricing: Arc<dyn ModelPricingRepo>,
    usage: Arc<dyn UsageRepo>,
    ledger: Arc<dyn LedgerRepo>,
}

impl CachedRepos {
    #[cfg(feature = "database-sqlite")]
    fn sqlite(pool: &sqlx::SqlitePool) -> Self {
        Self {
            users: Arc::new(sqlite::SqliteUserRepo::new(pool.clone())),
            api_keys: Arc::new(sqlite::SqliteApiKeyRepo::new(pool.clone())),
            session_tokens: Arc::new(sqlite::SqliteSessionTokenRepo::new(pool.clone())),
            budgets: Arc::new(sqlite::SqliteBudgetRepo::new(pool.clone())),
            model_pricing: Arc::new(sqlite::SqliteModelPricingRepo::new(pool.clone())),
            usage: Arc::new(sqlite::SqliteUsageRepo::new(pool.clone())),
            ledger: Arc::new(sqlite::SqliteLedgerRepo::new(pool.clone())),
        }
    }

    #[cfg(feature = "database-postgres")]
    fn postgres(write_pool: &sqlx::PgPool, read_pool: &Option<sqlx::PgPool>) -> Self {
        Self {
            users: Arc::new(postgres::PostgresUserRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            api_keys: Arc::new(postgres::PostgresApiKeyRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            session_tokens: Arc::new(postgres::PostgresSessionTokenRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            budgets: Arc::new(postgres::PostgresBudgetRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            model_pricing: Arc::new(postgres::PostgresModelPricingRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            usage: Arc::new(postgres::PostgresUsageRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            ledger: Arc::new(postgres::PostgresLedgerRepo::new(write_pool.clone())),
        }
    }
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(PgPoolPair),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Database pool supporting both SQLite and PostgreSQL.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        DbPool {
            repos: CachedRepos::sqlite(&pool),
            inner: PoolStorage::Sqlite(pool),
        }
    }

    /// Create a DbPool from existing PostgreSQL pools.
    /// Primarily useful for testing.
    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(write_pool: sqlx::PgPool, read_pool: Option<sqlx::PgPool>) -> Self {
        DbPool {
            repos: CachedRepos::postgres(&write_pool, &read_pool),
            inner: PoolStorage::Postgres(PgPoolPair {
                write: write_pool,
                read: read_pool,
            }),
        }
    }

    /// Create a database pool from configuration, running migrations when
    /// the configuration asks for it.
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let pool: Self = match config {
            DatabaseConfig::None => return Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.pool.max_connections)
                    .acquire_timeout(cfg.pool.acquire_timeout())
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(true)
                            .journal_mode(if cfg.wal {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                tracing::info!(
                    path = %cfg.path,
                    max_connections = cfg.pool.max_connections,
                    wal = cfg.wal,
                    "Opened SQLite database"
                );
                Self::from_sqlite(pool)
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let options = || {
                    sqlx::postgres::PgPoolOptions::new()
                        .min_connections(cfg.pool.min_connections)
                        .max_connections(cfg.pool.max_connections)
                        .acquire_timeout(cfg.pool.acquire_timeout())
                        .idle_timeout(cfg.pool.idle_timeout())
                };

                let write_pool = options().connect(&cfg.url).await?;

                let read_pool = if let Some(read_url) = &cfg.read_url {
                    tracing::info!("Configuring read replica pool");
                    Some(options().connect(read_url).await?)
                } else {
                    None
                };

                tracing::info!(
                    max_connections = cfg.pool.max_connections,
                    read_replica = read_pool.is_some(),
                    "Connected to PostgreSQL"
                );
                Self::from_postgres(write_pool, read_pool)
            }
        };

        if config.migrate_on_start() {
            pool.run_migrations().await?;
        }

        Ok(pool)
    }

    /// Run embedded migrations against the primary database.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_sqlx/postgres")
                    .run(&pools.write)
                    .await?;
                tracing::info!("PostgreSQL migrations completed successfully");
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Get user repository
    pub fn users(&self) -> Arc<dyn UserRepo> {
        Arc::clone(&self.repos.users)
    }

    /// Get API key repository
    pub fn api_keys(&self) -> Arc<dyn ApiKeyRepo> {
        Arc::clone(&self.repos.api_keys)
    }

    /// Get session token repository
    pub fn session_tokens(&self) -> Arc<dyn SessionTokenRepo> {
        Arc::clone(&self.repos.session_tokens)
    }

    /// Get budget repository
    pub fn budgets(&self) -> Arc<dyn BudgetRepo> {
        Arc::clone(&self.repos.budgets)
    }

    /// Get model pricing repository
    pub fn model_pricing(&self) -> Arc<dyn ModelPricingRepo> {
        Arc::clone(&self.repos.model_pricing)
    }

    /// Get usage repository
    pub fn usage(&self) -> Arc<dyn UsageRepo> {
        Arc::clone(&self.repos.usage)
    }

    /// Get ledger repository
    pub fn ledger(&self) -> Arc<dyn LedgerRepo> {
        Arc::clone(&self.repos.ledger)
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                sqlx::query("SELECT 1").execute(&pools.write).await?;
                if let Some(read) = &pools.read {
                    sqlx::query("SELECT 1").execute(read).await?;
                }
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
