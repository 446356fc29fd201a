use crate::db::error::DbError;

/// Map a unique-index violation to `Conflict`, anything else to `Sqlx`.
pub fn map_unique_violation(e: sqlx::Error, message: impl FnOnce() -> String) -> DbError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Conflict(message())
        }
        _ => DbError::from(e),
    }
}
