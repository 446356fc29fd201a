use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;
use validator::Validate;

use super::common::map_unique_violation;
use crate::{
    db::{error::DbResult, repos::ModelPricingRepo},
    models::{CreateModelPricing, ModelPricing},
};

const PRICING_COLUMNS: &str = "id, provider, model, effective_from, input_price_per_token, \
                               output_price_per_token, cache_price_per_token, created_at";

pub struct PostgresModelPricingRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresModelPricingRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_pricing(row: &sqlx::postgres::PgRow) -> ModelPricing {
        ModelPricing {
            id: row.get("id"),
            provider: row.get("provider"),
            model: row.get("model"),
            effective_from: row.get("effective_from"),
            input_price_per_token: row.get("input_price_per_token"),
            output_price_per_token: row.get("output_price_per_token"),
            cache_price_per_token: row.get("cache_price_per_token"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ModelPricingRepo for PostgresModelPricingRepo {
    async fn create(&self, input: CreateModelPricing) -> DbResult<ModelPricing> {
        input.validate()?;

        let query = format!(
            r#"
            INSERT INTO model_pricing (
                id, provider, model, effective_from,
                input_price_per_token, output_price_per_token, cache_price_per_token
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRICING_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&input.provider)
            .bind(&input.model)
            .bind(input.effective_from)
            .bind(input.input_price_per_token)
            .bind(input.output_price_per_token)
            .bind(input.cache_price_per_token)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| {
                map_unique_violation(e, || {
                    format!(
                        "Pricing for provider '{}' model '{}' effective {} already exists",
                        input.provider, input.model, input.effective_from
                    )
                })
            })?;

        Ok(Self::row_to_pricing(&row))
    }

    async fn resolve(
        &self,
        provider: &str,
        model: &str,
        as_of: DateTime<Utc>,
    ) -> DbResult<Option<ModelPricing>> {
        // Effective rows sort first (latest to oldest), then future rows
        // (earliest first) as the fallback.
        let query = format!(
            r#"
            SELECT {PRICING_COLUMNS} FROM model_pricing
            WHERE provider = $1 AND model = $2
            ORDER BY (effective_from <= $3) DESC,
                     CASE WHEN effective_from <= $3 THEN effective_from END DESC,
                     effective_from ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&query)
            .bind(provider)
            .bind(model)
            .bind(as_of)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_pricing))
    }

    async fn list_for_model(&self, provider: &str, model: &str) -> DbResult<Vec<ModelPricing>> {
        let query = format!(
            r#"
            SELECT {PRICING_COLUMNS} FROM model_pricing
            WHERE provider = $1 AND model = $2
            ORDER BY effective_from ASC
            "#
        );
        let rows = sqlx::query(&query)
            .bind(provider)
            .bind(model)
            .fetch_all(&self.read_pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_pricing).collect())
    }
}
