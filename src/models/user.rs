use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A billable tenant.
///
/// Money columns are microcents (1/1,000,000 of a dollar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub alias: Option<String>,
    /// Spendable prepaid balance. May go negative through bounded overspend.
    pub credit_balance: i64,
    /// Lifetime spend. Never decreases.
    pub spend_total: i64,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    #[validate(length(min = 1, max = 255))]
    pub alias: Option<String>,
    /// Starting credit balance in microcents.
    #[validate(range(min = 0))]
    #[serde(default)]
    pub credit_balance: i64,
}

impl CreateUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            alias: None,
            credit_balance: 0,
        }
    }

    pub fn with_credit(mut self, microcents: i64) -> Self {
        self.credit_balance = microcents;
        self
    }
}
