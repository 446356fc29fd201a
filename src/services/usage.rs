use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult},
    models::{CreateUsageLog, UsageLog},
};

/// Writes the audit row for every upstream call, before any pricing.
///
/// Recording is not idempotent: each call inserts a new row, so callers
/// must never retry it.
#[derive(Clone)]
pub struct UsageRecorder {
    db: Arc<DbPool>,
}

impl UsageRecorder {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Insert a usage row with a null cost and return it.
    pub async fn record(&self, input: CreateUsageLog) -> DbResult<UsageLog> {
        let row = self.db.usage().create(input).await?;
        tracing::debug!(
            usage_id = %row.id,
            user_id = %row.user_id,
            provider = %row.provider,
            model = %row.model,
            prompt_tokens = row.prompt_tokens,
            completion_tokens = row.completion_tokens,
            cache_tokens = row.cache_tokens,
            "Usage recorded"
        );
        Ok(row)
    }

    /// Like [`record`](Self::record), returning only the row id.
    pub async fn record_usage(&self, input: CreateUsageLog) -> DbResult<Uuid> {
        self.record(input).await.map(|row| row.id)
    }

    pub async fn get(&self, id: Uuid) -> DbResult<Option<UsageLog>> {
        self.db.usage().get_by_id(id).await
    }

    /// Rows still waiting for a cost, oldest first.
    pub async fn list_unpriced(&self, limit: u32) -> DbResult<Vec<UsageLog>> {
        self.db.usage().list_unpriced(limit).await
    }

    pub async fn list_by_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<UsageLog>> {
        self.db.usage().list_by_user(user_id, limit).await
    }

    pub async fn total_cost_for_user(&self, user_id: &str) -> DbResult<i64> {
        self.db.usage().total_cost_for_user(user_id).await
    }
}
