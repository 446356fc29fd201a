use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    auth::AuthError, db::DbError, error::ErrorResponse, extract::ExtractError,
    pricing::PricingError, services::CreditError,
};

/// Any failure of a kernel call.
///
/// Storage faults from every layer are folded into [`KernelError::Storage`],
/// so the other variants only ever carry ordinary rejections.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Auth(AuthError),

    #[error(transparent)]
    Credit(CreditError),

    #[error(transparent)]
    Pricing(PricingError),

    #[error(transparent)]
    Extract(ExtractError),

    #[error("Storage error: {0}")]
    Storage(DbError),
}

impl KernelError {
    pub fn code(&self) -> &'static str {
        match self {
            KernelError::Auth(e) => e.code(),
            KernelError::Credit(e) => e.code(),
            KernelError::Pricing(e) => e.code(),
            KernelError::Extract(e) => e.code(),
            KernelError::Storage(_) => "internal_error",
        }
    }

    /// Whether this is a rejection the caller caused, as opposed to a fault
    /// worth alerting on.
    pub fn is_expected(&self) -> bool {
        match self {
            KernelError::Auth(e) => e.is_expected(),
            KernelError::Credit(e) => e.is_expected(),
            KernelError::Pricing(e) => e.is_expected(),
            KernelError::Extract(e) => e.is_expected(),
            KernelError::Storage(_) => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            KernelError::Auth(e) => e.status(),
            KernelError::Credit(e) => e.status(),
            KernelError::Pricing(e) => e.status(),
            KernelError::Extract(e) => e.status(),
            KernelError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for KernelError {
    fn from(e: DbError) -> Self {
        KernelError::Storage(e)
    }
}

impl From<AuthError> for KernelError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Storage(db) => KernelError::Storage(db),
            other => KernelError::Auth(other),
        }
    }
}

impl From<CreditError> for KernelError {
    fn from(e: CreditError) -> Self {
        match e {
            CreditError::Storage(db) => KernelError::Storage(db),
            other => KernelError::Credit(other),
        }
    }
}

impl From<PricingError> for KernelError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::Storage(db) => KernelError::Storage(db),
            other => KernelError::Pricing(other),
        }
    }
}

impl From<ExtractError> for KernelError {
    fn from(e: ExtractError) -> Self {
        KernelError::Extract(e)
    }
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        match self {
            KernelError::Auth(e) => e.into_response(),
            KernelError::Credit(e) => e.into_response(),
            KernelError::Pricing(e) => e.into_response(),
            KernelError::Extract(e) => e.into_response(),
            KernelError::Storage(e) => {
                tracing::error!(error = %e, "Billing storage error");
                let body =
                    ErrorResponse::with_type("server_error", "internal_error", "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_storage_faults_are_folded() {
        let from_auth = KernelError::from(AuthError::Storage(DbError::NotFound));
        assert!(matches!(from_auth, KernelError::Storage(DbError::NotFound)));

        let from_credit = KernelError::from(CreditError::Storage(DbError::Internal("x".into())));
        assert!(matches!(from_credit, KernelError::Storage(_)));

        let from_pricing = KernelError::from(PricingError::Storage(DbError::NotConfigured));
        assert!(matches!(from_pricing, KernelError::Storage(_)));
        assert!(!from_pricing.is_expected());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                KernelError::from(AuthError::MissingCredential),
                StatusCode::UNAUTHORIZED,
            ),
            (
                KernelError::from(AuthError::AmbiguousTarget("no target".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                KernelError::from(CreditError::InsufficientCredit { credit_balance: 0 }),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                KernelError::from(CreditError::UserBlocked("bob".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                KernelError::from(PricingError::UnknownModel {
                    provider: "openai".into(),
                    model: "gpt-9".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                KernelError::from(DbError::Internal("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_expected_rejections() {
        assert!(KernelError::from(AuthError::RevokedCredential).is_expected());
        assert!(
            KernelError::from(CreditError::BudgetExhausted {
                budget_id: uuid::Uuid::new_v4(),
                period: "monthly".into(),
                remaining: 0,
            })
            .is_expected()
        );
        assert!(!KernelError::from(PricingError::CostOverflow).is_expected());
        assert!(!KernelError::from(DbError::NotFound).is_expected());
    }
}
