use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Where the ledger lives.
///
/// ```toml
/// [database]
/// type = "postgres"
/// url = "${DATABASE_URL}"
/// read_url = "${DATABASE_REPLICA_URL}"
///
/// [database.pool]
/// max_connections = 32
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum DatabaseConfig {
    /// Only the master key resolves and nothing can be charged.
    #[default]
    None,

    #[cfg(feature = "database-sqlite")]
    Sqlite(SqliteConfig),

    /// Use this when several gateway processes share one ledger.
    #[cfg(feature = "database-postgres")]
    Postgres(PostgresConfig),
}

impl DatabaseConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, DatabaseConfig::None)
    }

    /// Whether embedded migrations run when the pool is opened.
    pub fn migrate_on_start(&self) -> bool {
        match self {
            DatabaseConfig::None => false,
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => c.migrate_on_start,
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(c) => c.migrate_on_start,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DatabaseConfig::None => Ok(()),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => {
                if c.path.trim().is_empty() {
                    return Err(ConfigError::Validation(
                        "database.path cannot be empty".into(),
                    ));
                }
                c.pool.validate()
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(c) => {
                if c.url.trim().is_empty() {
                    return Err(ConfigError::Validation("database.url is required".into()));
                }
                if c.read_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                    return Err(ConfigError::Validation(
                        "database.read_url cannot be empty when set".into(),
                    ));
                }
                c.pool.validate()
            }
        }
    }
}

/// Connection pool sizing, shared by both backends.
#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Ignored by SQLite.
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Close connections idle for this long. Ignored by SQLite.
    pub idle_timeout_secs: u64,
}

#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            min_connections: 1,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
impl PoolSettings {
    pub fn acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.pool.max_connections must be at least 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Validation(format!(
                "database.pool.min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

#[cfg(feature = "database-sqlite")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    /// Database file, created when missing.
    pub path: String,
    /// WAL journal, so ledger writers don't block credential lookups.
    pub wal: bool,
    pub busy_timeout_ms: u64,
    pub migrate_on_start: bool,
    pub pool: PoolSettings,
}

#[cfg(feature = "database-sqlite")]
impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "gateway-billing.db".into(),
            wal: true,
            busy_timeout_ms: 5_000,
            migrate_on_start: true,
            pool: PoolSettings {
                max_connections: 5,
                ..Default::default()
            },
        }
    }
}

#[cfg(feature = "database-postgres")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostgresConfig {
    /// Primary. Every ledger mutation goes here.
    pub url: String,
    /// Replica for credential and pricing reads.
    pub read_url: Option<String>,
    pub migrate_on_start: bool,
    pub pool: PoolSettings,
}

#[cfg(feature = "database-postgres")]
impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            read_url: None,
            migrate_on_start: true,
            pool: PoolSettings {
                max_connections: 20,
                ..Default::default()
            },
        }
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    #[test]
    fn test_sqlite_defaults() {
        let config = KernelConfig::from_str(
            r#"
            [database]
            type = "sqlite"
        "#,
        )
        .unwrap();

        let DatabaseConfig::Sqlite(sqlite) = &config.database else {
            panic!("expected sqlite, got {:?}", config.database);
        };
        assert_eq!(sqlite.path, "gateway-billing.db");
        assert!(sqlite.wal);
        assert_eq!(sqlite.pool.max_connections, 5);
        assert!(config.database.migrate_on_start());
    }

    #[test]
    fn test_pool_table() {
        let config = KernelConfig::from_str(
            r#"
            [database]
            type = "sqlite"
            path = "/var/lib/billing.db"
            migrate_on_start = false

            [database.pool]
            max_connections = 2
            acquire_timeout_secs = 3
        "#,
        )
        .unwrap();

        let DatabaseConfig::Sqlite(sqlite) = &config.database else {
            panic!("expected sqlite");
        };
        assert_eq!(sqlite.pool.max_connections, 2);
        assert_eq!(sqlite.pool.acquire_timeout(), std::time::Duration::from_secs(3));
        assert!(!config.database.migrate_on_start());
    }

    #[test]
    fn test_zero_connections_rejected() {
        let result = KernelConfig::from_str(
            r#"
            [database]
            type = "sqlite"

            [database.pool]
            max_connections = 0
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_database_field_rejected() {
        let result = KernelConfig::from_str(
            r#"
            [database]
            type = "sqlite"
            create_if_missing = false
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[cfg(feature = "database-postgres")]
    #[test]
    fn test_postgres_requires_url() {
        let result = KernelConfig::from_str(
            r#"
            [database]
            type = "postgres"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[cfg(feature = "database-postgres")]
    #[test]
    fn test_postgres_min_above_max_rejected() {
        let result = KernelConfig::from_str(
            r#"
            [database]
            type = "postgres"
            url = "postgres://localhost/billing"

            [database.pool]
            min_connections = 10
            max_connections = 4
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
