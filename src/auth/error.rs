use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{db::DbError, error::ErrorResponse};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential of any kind was presented
    #[error("Authentication credentials required")]
    MissingCredential,

    /// Unknown, malformed, or wrong credential (generic to prevent enumeration)
    #[error("Invalid authentication credentials")]
    InvalidCredential,

    #[error("Credential has expired")]
    ExpiredCredential,

    #[error("Credential has been revoked")]
    RevokedCredential,

    /// The acting user cannot be determined from the input, or the
    /// explicit target contradicts the credential's owner
    #[error("Ambiguous target user: {0}")]
    AmbiguousTarget(String),

    /// Storage failed while looking the credential up
    #[error("Credential lookup failed: {0}")]
    Storage(#[from] DbError),
}

impl AuthError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::ExpiredCredential => "expired_credential",
            AuthError::RevokedCredential => "revoked_credential",
            AuthError::AmbiguousTarget(_) => "ambiguous_target",
            AuthError::Storage(_) => "internal_error",
        }
    }

    /// Whether this is an ordinary rejection rather than a fault.
    pub fn is_expected(&self) -> bool {
        !matches!(self, AuthError::Storage(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::AmbiguousTarget(_) => StatusCode::BAD_REQUEST,
            AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = match &self {
            AuthError::Storage(e) => {
                tracing::error!(error = %e, "Credential lookup failed");
                ErrorResponse::with_type("server_error", self.code(), "Internal server error")
            }
            AuthError::AmbiguousTarget(_) => {
                ErrorResponse::with_type("invalid_request_error", self.code(), self.to_string())
            }
            _ => ErrorResponse::with_type("authentication_error", self.code(), self.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}
