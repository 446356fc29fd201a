//! Model price schedules and cost computation.
//!
//! Prices are exact decimals in dollars per token; costs are rounded
//! half-to-even to the configured currency scale and stored as integer
//! microcents (1/1,000,000 of a dollar).

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::{
    db::{DbError, DbPool, DbResult},
    error::ErrorResponse,
    models::{CreateModelPricing, ModelPricing, TokenUsage},
};

/// Microcents per dollar.
pub const MICROCENTS_PER_DOLLAR: i64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("No pricing for model '{model}' of provider '{provider}'")]
    UnknownModel { provider: String, model: String },

    #[error("Invalid model reference '{0}'")]
    InvalidModelRef(String),

    #[error("Cost does not fit the ledger")]
    CostOverflow,

    #[error("Pricing lookup failed: {0}")]
    Storage(#[from] DbError),
}

impl PricingError {
    pub fn code(&self) -> &'static str {
        match self {
            PricingError::UnknownModel { .. } => "unknown_model",
            PricingError::InvalidModelRef(_) => "invalid_model",
            PricingError::CostOverflow => "cost_overflow",
            PricingError::Storage(_) => "internal_error",
        }
    }

    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PricingError::UnknownModel { .. } | PricingError::InvalidModelRef(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PricingError::UnknownModel { .. } => StatusCode::NOT_FOUND,
            PricingError::InvalidModelRef(_) => StatusCode::BAD_REQUEST,
            PricingError::CostOverflow | PricingError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let body = match &self {
            PricingError::UnknownModel { .. } => {
                ErrorResponse::with_type("not_found_error", self.code(), self.to_string())
            }
            PricingError::InvalidModelRef(_) => {
                ErrorResponse::with_type("invalid_request_error", self.code(), self.to_string())
            }
            PricingError::CostOverflow | PricingError::Storage(_) => {
                tracing::error!(error = %self, "Pricing failed");
                ErrorResponse::with_type("server_error", self.code(), "Internal server error")
            }
        };
        (self.status(), Json(body)).into_response()
    }
}

/// A `(provider, model)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse `provider:model` or `provider/model`; a bare model name uses
    /// `default_provider`.
    ///
    /// The first `:` wins over any `/`, so `together:meta-llama/Llama-3`
    /// keeps the slash in the model name.
    pub fn parse(value: &str, default_provider: Option<&str>) -> Result<Self, PricingError> {
        let value = value.trim();
        let invalid = || PricingError::InvalidModelRef(value.to_string());

        let (provider, model) = if let Some((provider, model)) = value.split_once(':') {
            (provider, model)
        } else if let Some((provider, model)) = value.split_once('/') {
            (provider, model)
        } else {
            (default_provider.ok_or_else(invalid)?, value)
        };

        if provider.is_empty() || model.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(provider, model))
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// `prompt * input + completion * output + cache * cache`, rounded
/// half-to-even to `scale` decimal places of a dollar.
pub fn compute_cost(
    usage: &TokenUsage,
    price: &ModelPricing,
    scale: u32,
) -> Result<Decimal, PricingError> {
    let term = |tokens: i64, rate: Decimal| Decimal::from(tokens).checked_mul(rate);

    let raw = term(usage.prompt_tokens, price.input_price_per_token)
        .zip(term(usage.completion_tokens, price.output_price_per_token))
        .and_then(|(input, output)| input.checked_add(output))
        .zip(term(usage.cache_tokens, price.cache_price_per_token))
        .and_then(|(subtotal, cache)| subtotal.checked_add(cache))
        .ok_or(PricingError::CostOverflow)?;

    Ok(raw.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven))
}

/// Convert a dollar amount with at most six decimal places to microcents.
pub fn dollars_to_microcents(amount: Decimal) -> Result<i64, PricingError> {
    amount
        .checked_mul(Decimal::from(MICROCENTS_PER_DOLLAR))
        .map(|micro| micro.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
        .and_then(|micro| micro.to_i64())
        .ok_or(PricingError::CostOverflow)
}

pub fn microcents_to_dollars(microcents: i64) -> Decimal {
    Decimal::new(microcents, 6)
}

/// Versioned price lookup backed by the `model_pricing` table.
#[derive(Clone)]
pub struct PricingCatalog {
    db: Arc<DbPool>,
    default_provider: Option<String>,
}

impl PricingCatalog {
    pub fn new(db: Arc<DbPool>, default_provider: Option<String>) -> Self {
        Self {
            db,
            default_provider,
        }
    }

    /// Parse a model reference using the configured default provider.
    pub fn parse_model(&self, value: &str) -> Result<ModelRef, PricingError> {
        ModelRef::parse(value, self.default_provider.as_deref())
    }

    /// Price schedule in force at `as_of`.
    ///
    /// When the model is priced but no row is effective yet, the earliest
    /// row applies. A model with no rows at all is `UnknownModel`.
    pub async fn resolve_price(
        &self,
        provider: &str,
        model: &str,
        as_of: DateTime<Utc>,
    ) -> Result<ModelPricing, PricingError> {
        let price = self
            .db
            .model_pricing()
            .resolve(provider, model, as_of)
            .await?
            .ok_or_else(|| PricingError::UnknownModel {
                provider: provider.to_string(),
                model: model.to_string(),
            })?;

        if price.effective_from > as_of {
            tracing::debug!(
                provider,
                model,
                effective_from = %price.effective_from,
                as_of = %as_of,
                "No pricing effective yet, using earliest schedule"
            );
        }

        Ok(price)
    }

    /// Fail early for a model nobody priced, before any upstream call.
    pub async fn ensure_priced(&self, provider: &str, model: &str) -> Result<(), PricingError> {
        self.resolve_price(provider, model, Utc::now())
            .await
            .map(|_| ())
    }

    pub async fn create(&self, input: CreateModelPricing) -> DbResult<ModelPricing> {
        let created = self.db.model_pricing().create(input).await?;
        tracing::info!(
            provider = %created.provider,
            model = %created.model,
            effective_from = %created.effective_from,
            "Model pricing added"
        );
        Ok(created)
    }

    pub async fn list_for_model(&self, provider: &str, model: &str) -> DbResult<Vec<ModelPricing>> {
        self.db.model_pricing().list_for_model(provider, model).await
    }
}
