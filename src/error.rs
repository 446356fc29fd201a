//! Error body shared by every HTTP mapping of kernel errors.

use serde::{Deserialize, Serialize};

/// OpenAI-compatible error envelope: `{"error": {"type", "message", "code"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Classification such as `authentication_error` or `server_error`.
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Common error types:
    /// - "invalid_request_error" - malformed or inconsistent input
    /// - "authentication_error" - missing or unusable credential
    /// - "permission_error" - authenticated but not allowed to spend
    /// - "not_found_error" - unknown resource such as an unpriced model
    /// - "server_error" - storage or other internal fault
    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
                code: Some(code.into()),
            },
        }
    }
}
