use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Price schedule of one model, effective from a point in time.
///
/// Prices are exact decimals in dollars per token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub id: Uuid,
    pub provider: String,
    pub model: String,
    pub effective_from: DateTime<Utc>,
    pub input_price_per_token: Decimal,
    pub output_price_per_token: Decimal,
    pub cache_price_per_token: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateModelPricing {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(min = 1, max = 255))]
    pub model: String,
    pub effective_from: DateTime<Utc>,
    #[validate(custom(function = "non_negative_price"))]
    pub input_price_per_token: Decimal,
    #[validate(custom(function = "non_negative_price"))]
    pub output_price_per_token: Decimal,
    #[validate(custom(function = "non_negative_price"))]
    #[serde(default)]
    pub cache_price_per_token: Decimal,
}

fn non_negative_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(validator::ValidationError::new("negative_price"));
    }
    Ok(())
}
