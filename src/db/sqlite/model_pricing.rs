use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use super::common::{map_unique_violation, parse_decimal, parse_uuid};
use crate::{
    db::{error::DbResult, repos::ModelPricingRepo},
    models::{CreateModelPricing, ModelPricing},
};

const PRICING_COLUMNS: &str = "id, provider, model, effective_from, input_price_per_token, \
                               output_price_per_token, cache_price_per_token, created_at";

pub struct SqliteModelPricingRepo {
    pool: SqlitePool,
}

impl SqliteModelPricingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_pricing(row: &sqlx::sqlite::SqliteRow) -> DbResult<ModelPricing> {
        Ok(ModelPricing {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            provider: row.get("provider"),
            model: row.get("model"),
            effective_from: row.get("effective_from"),
            input_price_per_token: parse_decimal(&row.get::<String, _>("input_price_per_token"))?,
            output_price_per_token: parse_decimal(
                &row.get::<String, _>("output_price_per_token"),
            )?,
            cache_price_per_token: parse_decimal(&row.get::<String, _>("cache_price_per_token"))?,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl ModelPricingRepo for SqliteModelPricingRepo {
    async fn create(&self, input: CreateModelPricing) -> DbResult<ModelPricing> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO model_pricing (
                id, provider, model, effective_from,
                input_price_per_token, output_price_per_token, cache_price_per_token, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.provider)
        .bind(&input.model)
        .bind(input.effective_from)
        .bind(input.input_price_per_token.to_string())
        .bind(input.output_price_per_token.to_string())
        .bind(input.cache_price_per_token.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                format!(
                    "Pricing for provider '{}' model '{}' effective {} already exists",
                    input.provider, input.model, input.effective_from
                )
            })
        })?;

        Ok(ModelPricing {
            id,
            provider: input.provider,
            model: input.model,
            effective_from: input.effective_from,
            input_price_per_token: input.input_price_per_token,
            output_price_per_token: input.output_price_per_token,
            cache_price_per_token: input.cache_price_per_token,
            created_at: now,
        })
    }

    async fn resolve(
        &self,
        provider: &str,
        model: &str,
        as_of: DateTime<Utc>,
    ) -> DbResult<Option<ModelPricing>> {
        let effective = format!(
            r#"
            SELECT {PRICING_COLUMNS} FROM model_pricing
            WHERE provider = ? AND model = ? AND effective_from <= ?
            ORDER BY effective_from DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&effective)
            .bind(provider)
            .bind(model)
            .bind(as_of)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Self::row_to_pricing(&row).map(Some);
        }

        let earliest = format!(
            r#"
            SELECT {PRICING_COLUMNS} FROM model_pricing
            WHERE provider = ? AND model = ?
            ORDER BY effective_from ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&earliest)
            .bind(provider)
            .bind(model)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_pricing).transpose()
    }

    async fn list_for_model(&self, provider: &str, model: &str) -> DbResult<Vec<ModelPricing>> {
        let query = format!(
            r#"
            SELECT {PRICING_COLUMNS} FROM model_pricing
            WHERE provider = ? AND model = ?
            ORDER BY effective_from ASC
            "#
        );
        let rows = sqlx::query(&query)
            .bind(provider)
            .bind(model)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_pricing).collect()
    }
}
