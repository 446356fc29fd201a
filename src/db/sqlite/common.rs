use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::error::{DbError, DbResult};

/// Parse a UUID string from the database, returning a DbError on failure
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("Invalid UUID in database: {}", e)))
}

pub fn parse_optional_uuid(s: Option<String>) -> DbResult<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

/// Prices are stored as TEXT so SQLite never rounds them through a float.
pub fn parse_decimal(s: &str) -> DbResult<Decimal> {
    Decimal::from_str(s)
        .map_err(|e| DbError::Internal(format!("Invalid decimal in database '{}': {}", s, e)))
}

/// Map a unique-index violation to `Conflict`, anything else to `Sqlx`.
pub fn map_unique_violation(e: sqlx::Error, message: impl FnOnce() -> String) -> DbError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Conflict(message())
        }
        _ => DbError::from(e),
    }
}
