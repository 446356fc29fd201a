use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{CreateModelPricing, ModelPricing},
};

#[async_trait]
pub trait ModelPricingRepo: Send + Sync {
    /// Fails with `Conflict` on a duplicate `(provider, model, effective_from)`.
    async fn create(&self, input: CreateModelPricing) -> DbResult<ModelPricing>;

    /// The row in force at `as_of`: the latest with `effective_from <= as_of`,
    /// or the earliest row when none is effective yet. `None` only when
    /// the model has no pricing at all.
    async fn resolve(
        &self,
        provider: &str,
        model: &str,
        as_of: DateTime<Utc>,
    ) -> DbResult<Option<ModelPricing>>;

    /// Every row for a model, oldest first.
    async fn list_for_model(&self, provider: &str, model: &str) -> DbResult<Vec<ModelPricing>>;
}
