//! Pre-flight spend check.
//!
//! The check is advisory: nothing is locked or reserved, because the cost
//! of a call is only known once the provider reports token counts. Calls
//! that pass concurrently at the boundary can each be charged afterwards,
//! so a balance may end up negative by at most the cost of the calls in
//! flight at that moment.

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    db::{DbError, DbPool},
    error::ErrorResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("Insufficient credit")]
    InsufficientCredit { credit_balance: i64 },

    /// An in-scope budget has nothing left for its period.
    #[error("Budget exhausted for the current {period} period")]
    BudgetExhausted {
        budget_id: Uuid,
        period: String,
        remaining: i64,
    },

    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    #[error("User '{0}' is blocked")]
    UserBlocked(String),

    #[error("Credit check failed: {0}")]
    Storage(#[from] DbError),
}

impl CreditError {
    pub fn code(&self) -> &'static str {
        match self {
            CreditError::InsufficientCredit { .. } => "insufficient_credit",
            CreditError::BudgetExhausted { .. } => "budget_exceeded",
            CreditError::UnknownUser(_) => "unknown_user",
            CreditError::UserBlocked(_) => "user_blocked",
            CreditError::Storage(_) => "internal_error",
        }
    }

    /// Budget exhaustion is a kind of insufficient credit.
    pub fn is_insufficient_credit(&self) -> bool {
        matches!(
            self,
            CreditError::InsufficientCredit { .. } | CreditError::BudgetExhausted { .. }
        )
    }

    pub fn is_expected(&self) -> bool {
        !matches!(self, CreditError::Storage(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CreditError::InsufficientCredit { .. } | CreditError::BudgetExhausted { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            CreditError::UnknownUser(_) | CreditError::UserBlocked(_) => StatusCode::FORBIDDEN,
            CreditError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CreditError {
    fn into_response(self) -> Response {
        let body = match &self {
            CreditError::Storage(e) => {
                tracing::error!(error = %e, "Credit check failed");
                ErrorResponse::with_type("server_error", self.code(), "Internal server error")
            }
            _ => ErrorResponse::with_type("permission_error", self.code(), self.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct CreditGuard {
    db: Arc<DbPool>,
}

impl CreditGuard {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Fails when the user is unknown or blocked, has no positive credit,
    /// or any active budget in scope (the user's, and the key's when one
    /// is given) has `remaining <= 0`.
    pub async fn validate_credit(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
    ) -> Result<(), CreditError> {
        let user = self
            .db
            .users()
            .get(user_id)
            .await?
            .ok_or_else(|| CreditError::UnknownUser(user_id.to_string()))?;

        if user.blocked {
            tracing::info!(user_id, "Credit denied: user blocked");
            return Err(CreditError::UserBlocked(user.user_id));
        }

        if user.credit_balance <= 0 {
            tracing::info!(
                user_id,
                credit_balance = user.credit_balance,
                "Credit denied: balance exhausted"
            );
            return Err(CreditError::InsufficientCredit {
                credit_balance: user.credit_balance,
            });
        }

        let budgets = self.db.budgets().list_in_scope(user_id, api_key_id).await?;
        if let Some(budget) = budgets.iter().find(|b| b.is_exhausted()) {
            tracing::info!(
                user_id,
                budget_id = %budget.id,
                remaining = budget.remaining,
                period_key = %budget.period_key,
                "Credit denied: budget exhausted"
            );
            return Err(CreditError::BudgetExhausted {
                budget_id: budget.id,
                period: budget.period.to_string(),
                remaining: budget.remaining,
            });
        }

        Ok(())
    }
}
